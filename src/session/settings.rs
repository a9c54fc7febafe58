use crate::executor::{ExecutorType, LocalCacheScope};
use crate::types::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Process-wide behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wrap every executor in the shared-cache decorator
    pub cache_enabled: bool,
    pub local_cache_scope: LocalCacheScope,
    pub default_executor_type: ExecutorType,
    /// Seconds; statements without their own timeout use this
    pub default_statement_timeout: Option<u64>,
    pub use_generated_keys: bool,
    /// Prepended to statement ids in log output
    pub log_prefix: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout: None,
            use_generated_keys: false,
            log_prefix: None,
        }
    }
}

impl Settings {
    /// Load settings with priority: ENV > config file > defaults.
    ///
    /// With an explicit `path` the file must exist. Otherwise
    /// `./sqlmapper.toml` and `<config dir>/sqlmapper/sqlmapper.toml` are
    /// tried in that order and the first one found is used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_paths().into_iter().find(|p| p.exists()),
        };
        if let Some(file) = &source {
            builder = builder.add_source(File::from(file.as_path()));
        }

        // SQLMAPPER_CACHE_ENABLED, SQLMAPPER_LOG_PREFIX, ...
        builder = builder.add_source(Environment::with_prefix("SQLMAPPER").try_parsing(true));

        let settings = builder.build()?.try_deserialize()?;
        if let Some(file) = source {
            info!("Loaded settings from: {}", file.display());
        }
        Ok(settings)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_statement_timeout.map(Duration::from_secs)
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("./sqlmapper.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("sqlmapper").join("sqlmapper.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.cache_enabled);
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Session);
        assert_eq!(settings.default_executor_type, ExecutorType::Simple);
        assert_eq!(settings.default_timeout(), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "cache_enabled = false\nlocal_cache_scope = \"statement\"\ndefault_executor_type = \"batch\"\ndefault_statement_timeout = 15\nlog_prefix = \"app.\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert!(!settings.cache_enabled);
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Statement);
        assert_eq!(settings.default_executor_type, ExecutorType::Batch);
        assert_eq!(settings.default_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(settings.log_prefix.as_deref(), Some("app."));
        assert!(!settings.use_generated_keys);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "cache_enabled = \"sometimes\"").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());

        let mut broken = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(broken, "cache_enabled = [").unwrap();
        assert!(Settings::load(Some(broken.path())).is_err());
    }
}
