use anyhow::Result;
use degrees::db::{migrate, Db};
use degrees::dispatch::{HttpDispatcher, TaskDispatcher, TaskQueue, Worker};
use degrees::engine::RelaxEngine;
use degrees::http::HttpServer;
use degrees::provider::TmdbProvider;
use degrees::store::SqliteStore;
use degrees::Config;
use std::path::Path;
use std::sync::Arc;

/// Build the configured graph provider.
/// Extracted to avoid duplicating this setup between serve and worker paths.
fn build_provider(config: &Config) -> Result<TmdbProvider> {
    let api_key = std::env::var(&config.provider.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            config.provider.api_key_env
        )
    })?;

    Ok(TmdbProvider::new(
        api_key,
        config.provider.base_url.clone(),
        config.provider.timeout_secs,
    ))
}

/// Pick the fan-out dispatcher: the local durable queue, or HTTP push to a
/// remote relaxation endpoint when an external queue fronts the service.
fn build_dispatcher(config: &Config, queue: Arc<TaskQueue>) -> Arc<dyn TaskDispatcher> {
    match config.dispatcher.mode.as_str() {
        "http" => Arc::new(HttpDispatcher::new(
            config.dispatcher.relax_endpoint.clone(),
            config.provider.timeout_secs,
        )),
        _ => queue,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => {
            // HTTP relaxation endpoint plus, in local mode, the queue worker
            run_server().await?;
        }
        "worker" => {
            // Queue worker only
            run_worker().await?;
        }
        "verify" | _ => {
            // Default: verify database schema
            run_schema_verification().await?;
        }
    }

    Ok(())
}

/// Open the database and bring the schema up to date.
async fn init_db(config: &Config) -> Result<Arc<Db>> {
    let db = Arc::new(Db::new(config.db_path()));
    let migrations_dir = Path::new("migrations").to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;
    log::info!("Database initialized successfully");
    Ok(db)
}

/// Run the HTTP server (and the local worker, unless fan-out is pushed
/// to a remote endpoint)
async fn run_server() -> Result<()> {
    log::info!("Starting degrees v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let db = init_db(&config).await?;

    let store = Arc::new(SqliteStore::new(db.clone()));
    let queue = Arc::new(TaskQueue::new(db));
    let provider = Arc::new(build_provider(&config)?);
    let dispatcher = build_dispatcher(&config, queue.clone());

    let engine = Arc::new(RelaxEngine::new(store.clone(), provider, dispatcher.clone()));

    if config.dispatcher.mode == "local" {
        let worker = Worker::new(queue, engine.clone(), &config.dispatcher);
        tokio::spawn(async move { worker.run().await });
    }

    let server = HttpServer::new(engine, store, dispatcher, &config);
    server.run(config.http_server.port).await?;

    Ok(())
}

/// Run the queue worker without the HTTP front end
async fn run_worker() -> Result<()> {
    log::info!("Starting degrees worker v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let db = init_db(&config).await?;

    let store = Arc::new(SqliteStore::new(db.clone()));
    let queue = Arc::new(TaskQueue::new(db));
    let provider = Arc::new(build_provider(&config)?);

    // The worker always fans out through its own queue
    let engine = Arc::new(RelaxEngine::new(store, provider, queue.clone()));
    let worker = Worker::new(queue, engine, &config.dispatcher);
    worker.run().await;

    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting degrees v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Provider: {}", config.provider.base_url);
    log::info!("Dispatcher mode: {}", config.dispatcher.mode);

    let db = init_db(&config).await?;
    verify_database_schema(&db).await?;

    log::info!("Ready: seed a traversal with the seed utility or POST /seed");

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    use degrees::db::migrate;
    use degrees::error::DegreesError;

    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = vec!["adjacencies", "nodes", "schema_migrations", "tasks"];
        let mut all_tables_exist = true;

        for table in &expected_tables {
            if !tables.iter().any(|t| t == table) {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            } else {
                log::debug!("Table exists: {}", table);
            }
        }

        if !all_tables_exist {
            return Err(DegreesError::Config(
                "Not all required tables exist".to_string(),
            ));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        if applied.len() < 3 {
            return Err(DegreesError::Config(format!(
                "Expected at least 3 migrations, found {}",
                applied.len()
            )));
        }
        log::debug!("{} migrations applied", applied.len());

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
        )?;
        let indexes: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for index_name in ["idx_tasks_ready", "idx_nodes_distance", "idx_adjacencies_from"] {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("Index exists: {}", index_name);
            } else {
                log::warn!("Index not found: {} (migration 003 may not be applied)", index_name);
            }
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(DegreesError::Config(format!(
                "Journal mode is not WAL: {}",
                journal_mode
            )));
        }
        log::debug!("Journal mode: WAL");

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(DegreesError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }
        log::info!("Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("Database schema verification complete");
    Ok(())
}
