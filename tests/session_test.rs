// End-to-end session behaviour over the in-memory store

use parking_lot::Mutex;
use sqlmapper::cache::CacheBuilder;
use sqlmapper::executor::{CountingInterceptor, Executor, ExecutorType, Interceptor, LocalCacheScope, ResultContext};
use sqlmapper::mapping::{MappedStatement, ParameterMapping, SqlCommandType};
use sqlmapper::transaction::{MemoryDataSource, MemoryTransactionFactory};
use sqlmapper::types::{DatabaseError, Parameter, Row, SqlMapError, Value};
use sqlmapper::{Configuration, Environment, MapperMethod, MapperResult, ReturnKind, RowBounds, Settings, SqlSessionFactory};
use std::io::Write;
use std::sync::Arc;

const SELECT_ALL: &str = "SELECT * FROM blog";
const SELECT_BY_ID: &str = "SELECT * FROM blog WHERE id = ?";
const INSERT: &str = "INSERT INTO blog (id, title) VALUES (?, ?)";

fn blog(id: i64, title: &str) -> Row {
    Row::from_pairs([("id", Value::Integer(id)), ("title", Value::from(title))])
}

fn source() -> Arc<MemoryDataSource> {
    let source = Arc::new(MemoryDataSource::new());
    source.create_table("blog", vec![blog(1, "First"), blog(2, "Second"), blog(3, "Third")]);
    source.register_query(SELECT_ALL, |tables, _| Ok(tables.get("blog").cloned().unwrap_or_default()));
    source.register_query(SELECT_BY_ID, |tables, req| {
        let id = req.parameters.first().cloned().unwrap_or(Value::Null);
        Ok(tables
            .get("blog")
            .into_iter()
            .flatten()
            .filter(|r| r.get("id") == Some(&id))
            .cloned()
            .collect())
    });
    source.register_update(INSERT, |tables, req| {
        let [id, title] = req.parameters else {
            return Err(DatabaseError::ParameterCountMismatch {
                expected: 2,
                actual: req.parameters.len(),
            });
        };
        tables
            .get_mut("blog")
            .ok_or_else(|| DatabaseError::TableNotFound("blog".to_string()))?
            .push(Row::from_pairs([("id", id.clone()), ("title", title.clone())]));
        Ok(1)
    });
    source
}

fn configuration(settings: Settings, source: &Arc<MemoryDataSource>) -> Configuration {
    let factory = Arc::new(MemoryTransactionFactory::new(Arc::clone(source)));
    let mut config = Configuration::new(settings).with_environment(Environment::new("test", factory));
    let cache = CacheBuilder::new("blog").logging(false).build();
    config.add_cache(Arc::clone(&cache)).unwrap();

    let statements: Vec<MappedStatement> = vec![
        config
            .statement_builder("blog.all", SELECT_ALL, vec![], SqlCommandType::Select)
            .cache(Arc::clone(&cache))
            .build()
            .unwrap(),
        config
            .statement_builder(
                "blog.find",
                SELECT_BY_ID,
                vec![ParameterMapping::new("id")],
                SqlCommandType::Select,
            )
            .cache(Arc::clone(&cache))
            .build()
            .unwrap(),
        config
            .statement_builder(
                "blog.insert",
                INSERT,
                vec![ParameterMapping::new("id"), ParameterMapping::new("title")],
                SqlCommandType::Insert,
            )
            .cache(cache)
            .build()
            .unwrap(),
    ];
    for ms in statements {
        config.add_mapped_statement(ms).unwrap();
    }

    config
        .add_mapper_method("BlogMapper", "all", MapperMethod::new("blog.all", ReturnKind::Many))
        .unwrap();
    config
        .add_mapper_method("BlogMapper", "find", MapperMethod::new("blog.find", ReturnKind::One))
        .unwrap();
    config
        .add_mapper_method("BlogMapper", "byId", MapperMethod::new("blog.all", ReturnKind::Map("id".to_string())))
        .unwrap();
    config
        .add_mapper_method(
            "BlogMapper",
            "insert",
            MapperMethod::new("blog.insert", ReturnKind::Affected).params(&["id", "title"]),
        )
        .unwrap();
    config
}

fn factory(settings: Settings) -> (Arc<MemoryDataSource>, SqlSessionFactory) {
    let source = source();
    let factory = SqlSessionFactory::new(configuration(settings, &source));
    (source, factory)
}

fn new_blog(id: i64, title: &str) -> Parameter {
    Parameter::map([("id", Value::Integer(id)), ("title", Value::from(title))])
}

#[test]
fn test_committed_reads_are_shared_across_sessions() {
    let (source, factory) = factory(Settings::default());

    let mut first = factory.open_session().unwrap();
    assert_eq!(first.select_list("blog.all", &Parameter::None).unwrap().len(), 3);
    first.close().unwrap();

    let mut second = factory.open_session().unwrap();
    assert_eq!(second.select_list("blog.all", &Parameter::None).unwrap().len(), 3);
    second.close().unwrap();

    assert_eq!(source.stats().queries, 1);
}

#[test]
fn test_session_cache_without_shared_cache() {
    let settings = Settings {
        cache_enabled: false,
        ..Settings::default()
    };
    let (source, factory) = factory(settings);

    let session = factory.open_session().unwrap();
    session.select_list("blog.all", &Parameter::None).unwrap();
    session.select_list("blog.all", &Parameter::None).unwrap();
    assert_eq!(source.stats().queries, 1);

    let other = factory.open_session().unwrap();
    other.select_list("blog.all", &Parameter::None).unwrap();
    assert_eq!(source.stats().queries, 2);
}

#[test]
fn test_statement_scope_disables_repeat_hits() {
    let settings = Settings {
        cache_enabled: false,
        local_cache_scope: LocalCacheScope::Statement,
        ..Settings::default()
    };
    let (source, factory) = factory(settings);

    let session = factory.open_session().unwrap();
    session.select_list("blog.all", &Parameter::None).unwrap();
    session.select_list("blog.all", &Parameter::None).unwrap();
    assert_eq!(source.stats().queries, 2);
}

#[test]
fn test_insert_invalidates_shared_cache_on_commit() {
    let (source, factory) = factory(Settings::default());

    let mut reader = factory.open_session().unwrap();
    reader.select_list("blog.all", &Parameter::None).unwrap();
    reader.close().unwrap();

    let mut writer = factory.open_session().unwrap();
    assert_eq!(writer.insert("blog.insert", &new_blog(4, "Fourth")).unwrap(), 1);
    assert!(writer.is_dirty());
    writer.commit().unwrap();
    assert!(!writer.is_dirty());
    writer.close().unwrap();

    let mut reader = factory.open_session().unwrap();
    assert_eq!(reader.select_list("blog.all", &Parameter::None).unwrap().len(), 4);
    reader.close().unwrap();

    assert_eq!(source.stats().queries, 2);
    assert_eq!(source.stats().commits, 1);
}

#[test]
fn test_rollback_restores_store() {
    let (source, factory) = factory(Settings::default());

    let mut session = factory.open_session().unwrap();
    session.insert("blog.insert", &new_blog(4, "Fourth")).unwrap();
    assert_eq!(session.select_list("blog.all", &Parameter::None).unwrap().len(), 4);
    session.rollback().unwrap();
    assert_eq!(session.select_list("blog.all", &Parameter::None).unwrap().len(), 3);
    session.close().unwrap();

    assert_eq!(source.table("blog").unwrap().len(), 3);
    assert_eq!(source.stats().rollbacks, 1);
}

#[test]
fn test_closing_dirty_session_discards_writes() {
    let (source, factory) = factory(Settings::default());

    let mut session = factory.open_session().unwrap();
    session.insert("blog.insert", &new_blog(4, "Fourth")).unwrap();
    session.close().unwrap();
    assert_eq!(source.table("blog").unwrap().len(), 3);

    // A second close is a no-op; other operations fail
    session.close().unwrap();
    let err = session.select_list("blog.all", &Parameter::None).unwrap_err();
    assert!(err.is_closed_session());
}

#[test]
fn test_dropped_session_discards_writes() {
    let (source, factory) = factory(Settings::default());
    {
        let session = factory.open_session().unwrap();
        session.insert("blog.insert", &new_blog(4, "Fourth")).unwrap();
    }
    assert_eq!(source.table("blog").unwrap().len(), 3);
}

#[test]
fn test_auto_commit_session_keeps_writes() {
    let (source, factory) = factory(Settings::default());

    let mut session = factory.open_session_auto_commit(true).unwrap();
    session.insert("blog.insert", &new_blog(4, "Fourth")).unwrap();
    session.close().unwrap();

    assert_eq!(source.table("blog").unwrap().len(), 4);
    assert_eq!(source.stats().rollbacks, 0);
}

#[test]
fn test_batch_session_groups_consecutive_inserts() {
    let (source, factory) = factory(Settings::default());

    let mut session = factory.open_session_with_type(ExecutorType::Batch).unwrap();
    assert_eq!(session.insert("blog.insert", &new_blog(4, "Fourth")).unwrap(), 0);
    assert_eq!(session.insert("blog.insert", &new_blog(5, "Fifth")).unwrap(), 0);
    assert_eq!(source.stats().updates, 0);

    let results = session.flush_statements().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].statement_id, "blog.insert");
    assert_eq!(results[0].update_counts, vec![1, 1]);
    assert_eq!(results[0].total_updates(), 2);

    session.commit().unwrap();
    session.close().unwrap();

    assert_eq!(source.table("blog").unwrap().len(), 5);
    assert_eq!(source.stats().batches, 1);
}

#[test]
fn test_select_one_rejects_multiple_rows() {
    let (_source, factory) = factory(Settings::default());
    let session = factory.open_session().unwrap();

    let found = session
        .select_one("blog.find", &Parameter::map([("id", 2_i64)]))
        .unwrap()
        .unwrap();
    assert_eq!(found.get("title"), Some(&Value::from("Second")));
    assert!(session.select_one("blog.find", &Parameter::map([("id", 9_i64)])).unwrap().is_none());

    let err = session.select_one("blog.all", &Parameter::None).unwrap_err();
    assert!(matches!(err, SqlMapError::TooManyResults(3)));
}

#[test]
fn test_row_bounds_window_results() {
    let (_source, factory) = factory(Settings::default());
    let session = factory.open_session().unwrap();

    let rows = session
        .select_list_with_bounds("blog.all", &Parameter::None, RowBounds::new(1, 1))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(2)));
}

#[test]
fn test_streaming_select_can_stop_early() {
    let (_source, factory) = factory(Settings::default());
    let session = factory.open_session().unwrap();

    let mut titles = Vec::new();
    let mut handler = |row: Row, ctx: &mut ResultContext| {
        titles.push(row.get("title").cloned());
        if ctx.result_count() == 2 {
            ctx.stop();
        }
    };
    session
        .select("blog.all", &Parameter::None, RowBounds::DEFAULT, &mut handler)
        .unwrap();
    assert_eq!(titles.len(), 2);
}

#[test]
fn test_mapper_methods_dispatch_by_command() {
    let (_source, factory) = factory(Settings::default());
    let session = factory.open_session().unwrap();

    match session.invoke("BlogMapper", "find", &[Value::Integer(1)]).unwrap() {
        MapperResult::Row(Some(row)) => assert_eq!(row.get("title"), Some(&Value::from("First"))),
        other => panic!("unexpected result: {other:?}"),
    }

    let inserted = session
        .invoke("BlogMapper", "insert", &[Value::Integer(4), Value::from("Fourth")])
        .unwrap();
    assert_eq!(inserted, MapperResult::Affected(1));

    match session.invoke("BlogMapper", "all", &[]).unwrap() {
        MapperResult::Rows(rows) => assert_eq!(rows.len(), 4),
        other => panic!("unexpected result: {other:?}"),
    }

    match session.invoke("BlogMapper", "byId", &[]).unwrap() {
        MapperResult::Map(map) => {
            assert_eq!(map.len(), 4);
            assert_eq!(map[&Value::Integer(3)].get("title"), Some(&Value::from("Third")));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let err = session.invoke("BlogMapper", "missing", &[]).unwrap_err();
    assert!(matches!(err, SqlMapError::Binding(_)));
}

#[test]
fn test_mapper_method_must_fit_statement() {
    let source = source();
    let mut config = configuration(Settings::default(), &source);

    let err = config
        .add_mapper_method("BlogMapper", "bad", MapperMethod::new("blog.insert", ReturnKind::Many))
        .unwrap_err();
    assert!(matches!(err, SqlMapError::Configuration(_)));

    let err = config
        .add_mapper_method("BlogMapper", "gone", MapperMethod::new("blog.gone", ReturnKind::Many))
        .unwrap_err();
    assert!(matches!(err, SqlMapError::Configuration(ref msg) if msg.contains("blog.gone")));
}

#[test]
fn test_unknown_statement_is_reported() {
    let (_source, factory) = factory(Settings::default());
    let session = factory.open_session().unwrap();
    let err = session.select_list("blog.nope", &Parameter::None).unwrap_err();
    assert!(err.to_string().contains("blog.nope"));
}

#[test]
fn test_missing_environment_is_a_configuration_error() {
    let factory = SqlSessionFactory::new(Configuration::new(Settings::default()));
    assert!(matches!(factory.open_session(), Err(SqlMapError::Configuration(_))));
}

/// Records the order its hooks run in
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Interceptor for Recorder {
    fn before_query(&self, _ms: &MappedStatement, _parameter: &Parameter, _row_bounds: RowBounds) -> sqlmapper::Result<()> {
        self.log.lock().push(format!("before {}", self.name));
        Ok(())
    }

    fn after_query(&self, _ms: &MappedStatement, _rows: &[Row]) {
        self.log.lock().push(format!("after {}", self.name));
    }
}

/// Rejects every update
struct ReadOnly;

impl Interceptor for ReadOnly {
    fn before_update(&self, ms: &MappedStatement, _parameter: &Parameter) -> sqlmapper::Result<()> {
        Err(SqlMapError::Interceptor(format!("{} is read-only", ms.id())))
    }
}

#[test]
fn test_interceptors_wrap_in_registration_order() {
    let source = source();
    let mut config = configuration(Settings::default(), &source);
    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(CountingInterceptor::new());
    config.add_interceptor(Arc::new(Recorder {
        name: "outer",
        log: Arc::clone(&log),
    }));
    config.add_interceptor(Arc::new(Recorder {
        name: "inner",
        log: Arc::clone(&log),
    }));
    config.add_interceptor(Arc::clone(&counter) as Arc<dyn Interceptor>);
    let factory = SqlSessionFactory::new(config);

    let session = factory.open_session().unwrap();
    session.select_list("blog.all", &Parameter::None).unwrap();
    assert_eq!(
        log.lock().as_slice(),
        &["before outer", "before inner", "after inner", "after outer"]
    );
    assert_eq!(counter.counts().queries, 1);
    assert_eq!(counter.counts().rows, 3);
}

/// Fails every close
struct FailingClose;

impl Interceptor for FailingClose {
    fn before_close(&self, _force_rollback: bool) -> sqlmapper::Result<()> {
        Err(SqlMapError::Interceptor("close hook failed".to_string()))
    }
}

#[test]
fn test_close_hook_error_still_closes_chain() {
    let source = source();
    let mut config = configuration(Settings::default(), &source);
    config.add_interceptor(Arc::new(FailingClose));
    let factory = SqlSessionFactory::new(config);

    let mut session = factory.open_session().unwrap();
    session.select_list("blog.all", &Parameter::None).unwrap();
    let err = session.close().unwrap_err();
    assert!(matches!(err, SqlMapError::Interceptor(_)));
    assert!(session.is_closed());
    assert!(session.executor().is_closed());

    // The pending fill was committed by the close
    let cache = factory.configuration().cache("blog").unwrap();
    assert_eq!(cache.size(), 1);
    session.close().unwrap();
}

#[test]
fn test_interceptor_can_veto_updates() {
    let source = source();
    let mut config = configuration(Settings::default(), &source);
    config.add_interceptor(Arc::new(ReadOnly));
    let factory = SqlSessionFactory::new(config);

    let session = factory.open_session().unwrap();
    let err = session.insert("blog.insert", &new_blog(4, "Fourth")).unwrap_err();
    assert!(matches!(err, SqlMapError::Interceptor(_)));
    assert!(!session.is_dirty());
    assert_eq!(source.stats().updates, 0);
}

#[test]
fn test_settings_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "cache_enabled = false").unwrap();
    writeln!(file, "default_executor_type = \"batch\"").unwrap();
    writeln!(file, "local_cache_scope = \"statement\"").unwrap();
    writeln!(file, "default_statement_timeout = 30").unwrap();

    let settings = Settings::load(Some(file.path())).unwrap();
    assert!(!settings.cache_enabled);
    assert_eq!(settings.default_executor_type, ExecutorType::Batch);
    assert_eq!(settings.local_cache_scope, LocalCacheScope::Statement);
    assert_eq!(settings.default_statement_timeout, Some(30));
    assert!(!settings.use_generated_keys);
}

#[test]
fn test_missing_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(Settings::load(Some(&missing)).is_err());
}
