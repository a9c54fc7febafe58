use clap::Parser;
use comfy_table::{Cell, Table as ComfyTable, presets::UTF8_FULL};
use serde::Serialize;
use sqlmapper::cache::CacheBuilder;
use sqlmapper::executor::{CountingInterceptor, ExecutorType, OperationCounts};
use sqlmapper::mapping::{ParameterMapping, SqlCommandType};
use sqlmapper::transaction::{DataSourceStats, MemoryDataSource, MemoryTransactionFactory, Tables};
use sqlmapper::types::{DatabaseError, Row, Value};
use sqlmapper::{Configuration, Environment, MapperMethod, MapperResult, ReturnKind, Settings, SqlSessionFactory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SELECT_ALL: &str = "SELECT id, username, email FROM author ORDER BY id";
const SELECT_BY_ID: &str = "SELECT id, username, email FROM author WHERE id = ?";
const INSERT: &str = "INSERT INTO author (id, username, email) VALUES (?, ?, ?)";
const UPDATE_EMAIL: &str = "UPDATE author SET email = ? WHERE id = ?";

/// SqlMapper workload runner
#[derive(Parser, Debug)]
#[command(name = "sqlmapper")]
#[command(about = "Runs a mapped-statement workload against the in-memory store", long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Executor used by the write session (simple or batch)
    #[arg(short, long)]
    executor: Option<ExecutorType>,

    /// Number of read sessions to run before writing
    #[arg(short = 'n', long, default_value_t = 3)]
    iterations: usize,

    /// Print the run summary as JSON instead of tables
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    authors: Vec<Row>,
    data_source: DataSourceStats,
    operations: OperationCounts,
    cache_entries: usize,
}

fn author_table(tables: &mut Tables) -> Result<&mut Vec<Row>, DatabaseError> {
    tables
        .get_mut("author")
        .ok_or_else(|| DatabaseError::TableNotFound("author".to_string()))
}

fn author(id: i64, username: &str, email: &str) -> Row {
    Row::from_pairs([
        ("id", Value::Integer(id)),
        ("username", Value::from(username)),
        ("email", Value::from(email)),
    ])
}

fn data_source() -> Arc<MemoryDataSource> {
    let source = Arc::new(MemoryDataSource::new());
    source.create_table(
        "author",
        vec![
            author(101, "jim", "jim@example.com"),
            author(102, "sally", "sally@example.com"),
            author(103, "bob", "bob@example.com"),
        ],
    );

    source.register_query(SELECT_ALL, |tables, _| {
        let mut rows = tables.get("author").cloned().unwrap_or_default();
        rows.sort_by_key(|r| r.get("id").and_then(Value::as_int));
        Ok(rows)
    });
    source.register_query(SELECT_BY_ID, |tables, req| {
        let id = req.parameters.first().cloned().unwrap_or(Value::Null);
        Ok(tables
            .get("author")
            .into_iter()
            .flatten()
            .filter(|r| r.get("id") == Some(&id))
            .cloned()
            .collect())
    });
    source.register_update(INSERT, |tables, req| {
        let [id, username, email] = req.parameters else {
            return Err(DatabaseError::ParameterCountMismatch {
                expected: 3,
                actual: req.parameters.len(),
            });
        };
        let rows = author_table(tables)?;
        if rows.iter().any(|r| r.get("id") == Some(id)) {
            return Err(DatabaseError::ConstraintViolation(format!("duplicate author id {id}")));
        }
        rows.push(Row::from_pairs([
            ("id", id.clone()),
            ("username", username.clone()),
            ("email", email.clone()),
        ]));
        Ok(1)
    });
    source.register_update(UPDATE_EMAIL, |tables, req| {
        let [email, id] = req.parameters else {
            return Err(DatabaseError::ParameterCountMismatch {
                expected: 2,
                actual: req.parameters.len(),
            });
        };
        let mut updated = 0;
        for row in author_table(tables)?.iter_mut().filter(|r| r.get("id") == Some(id)) {
            row.set("email", email.clone());
            updated += 1;
        }
        Ok(updated)
    });
    source
}

fn configuration(settings: Settings, source: &Arc<MemoryDataSource>, counter: Arc<CountingInterceptor>) -> sqlmapper::Result<Configuration> {
    let environment = Environment::new("development", Arc::new(MemoryTransactionFactory::new(Arc::clone(source))));
    let mut config = Configuration::new(settings).with_environment(environment);
    config.add_interceptor(counter);

    let cache = CacheBuilder::new("AuthorMapper").size(256).build();
    config.add_cache(Arc::clone(&cache))?;

    let select_all = config
        .statement_builder("AuthorMapper.selectAll", SELECT_ALL, vec![], SqlCommandType::Select)
        .resource("AuthorMapper")
        .cache(Arc::clone(&cache))
        .build()?;
    let select_by_id = config
        .statement_builder(
            "AuthorMapper.selectById",
            SELECT_BY_ID,
            vec![ParameterMapping::new("id")],
            SqlCommandType::Select,
        )
        .resource("AuthorMapper")
        .cache(Arc::clone(&cache))
        .build()?;
    let insert = config
        .statement_builder(
            "AuthorMapper.insertAuthor",
            INSERT,
            vec![
                ParameterMapping::new("id"),
                ParameterMapping::new("username"),
                ParameterMapping::new("email"),
            ],
            SqlCommandType::Insert,
        )
        .resource("AuthorMapper")
        .cache(Arc::clone(&cache))
        .key_property("id")
        .build()?;
    let update_email = config
        .statement_builder(
            "AuthorMapper.updateEmail",
            UPDATE_EMAIL,
            vec![ParameterMapping::new("email"), ParameterMapping::new("id")],
            SqlCommandType::Update,
        )
        .resource("AuthorMapper")
        .cache(cache)
        .build()?;

    for ms in [select_all, select_by_id, insert, update_email] {
        config.add_mapped_statement(ms)?;
    }

    config.add_mapper_method("AuthorMapper", "selectAll", MapperMethod::new("AuthorMapper.selectAll", ReturnKind::Many))?;
    config.add_mapper_method(
        "AuthorMapper",
        "selectById",
        MapperMethod::new("AuthorMapper.selectById", ReturnKind::One).params(&["id"]),
    )?;
    config.add_mapper_method(
        "AuthorMapper",
        "insertAuthor",
        MapperMethod::new("AuthorMapper.insertAuthor", ReturnKind::Affected).params(&["id", "username", "email"]),
    )?;
    config.add_mapper_method(
        "AuthorMapper",
        "updateEmail",
        MapperMethod::new("AuthorMapper.updateEmail", ReturnKind::Affected).params(&["email", "id"]),
    )?;
    Ok(config)
}

fn rows_table(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(0 rows)\n".to_string();
    }

    let mut table = ComfyTable::new();
    table.load_preset(UTF8_FULL);
    table.set_header(rows[0].columns.iter().map(Cell::new));
    for row in rows {
        table.add_row(row.values.iter().map(|v| Cell::new(v.to_string())));
    }
    format!("{}\n({} rows)\n", table, rows.len())
}

fn stats_table(summary: &Summary) -> String {
    let mut table = ComfyTable::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![Cell::new("Metric"), Cell::new("Value")]);
    let data_source = summary.data_source;
    let operations = summary.operations;
    for (metric, value) in [
        ("store queries", data_source.queries),
        ("store updates", data_source.updates),
        ("store batches", data_source.batches),
        ("store commits", data_source.commits),
        ("store rollbacks", data_source.rollbacks),
        ("executor queries", operations.queries),
        ("executor rows", operations.rows),
        ("executor updates", operations.updates),
        ("session commits", operations.commits),
        ("shared cache entries", summary.cache_entries as u64),
    ] {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }
    table.to_string()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    let write_executor = args.executor.unwrap_or(settings.default_executor_type);
    info!(cache_enabled = settings.cache_enabled, executor = ?write_executor, "Starting workload");

    let source = data_source();
    let counter = Arc::new(CountingInterceptor::new());
    let factory = SqlSessionFactory::new(configuration(settings, &source, Arc::clone(&counter))?);

    // Read sessions: the first fills the shared cache, the rest hit it
    for round in 0..args.iterations {
        let mut session = factory.open_session()?;
        let all = session.invoke("AuthorMapper", "selectAll", &[])?;
        let one = session.invoke("AuthorMapper", "selectById", &[Value::Integer(101)])?;
        if let (MapperResult::Rows(all), MapperResult::Row(one)) = (&all, &one) {
            info!(round, authors = all.len(), found = one.is_some(), "Read session finished");
        }
        session.close()?;
    }

    // Write session: inserts and updates flush the shared cache on commit
    {
        let mut session = factory.open_session_with_type(write_executor)?;
        session.invoke(
            "AuthorMapper",
            "insertAuthor",
            &[Value::Integer(104), Value::from("ann"), Value::from("ann@example.com")],
        )?;
        session.invoke(
            "AuthorMapper",
            "insertAuthor",
            &[Value::Integer(105), Value::from("lee"), Value::from("lee@example.com")],
        )?;
        session.invoke(
            "AuthorMapper",
            "updateEmail",
            &[Value::from("jim@mapper.dev"), Value::Integer(101)],
        )?;
        for batch in session.flush_statements()? {
            info!(statement = %batch.statement_id, statements = batch.update_counts.len(), "Flushed batch");
        }
        session.commit()?;
        session.close()?;
    }

    let mut session = factory.open_session()?;
    let authors = session.select_list("AuthorMapper.selectAll", &sqlmapper::Parameter::None)?;
    session.close()?;

    let cache_entries = factory
        .configuration()
        .cache("AuthorMapper")
        .map_or(0, |cache| cache.size());
    let summary = Summary {
        authors,
        data_source: source.stats(),
        operations: counter.counts(),
        cache_entries,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("╔══════════════════════════════════════════════════════════╗");
        println!("║                   SqlMapper Workload                     ║");
        println!("╚══════════════════════════════════════════════════════════╝");
        print!("{}", rows_table(&summary.authors));
        println!("{}", stats_table(&summary));
    }

    Ok(())
}
