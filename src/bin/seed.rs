use anyhow::Result;
use clap::Parser;
use degrees::db::{migrate, Db};
use degrees::dispatch::{TaskDispatcher, TaskQueue};
use degrees::Config;
use degrees::NodeKind;
use std::path::Path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "seed")]
#[command(about = "Seed a degrees-of-separation traversal from a node")]
struct Args {
    /// Node kind: person or work
    kind: NodeKind,

    /// Raw provider identifier of the seed node
    raw_id: String,

    /// Candidate distance for the seed (0 starts a fresh traversal)
    #[arg(short, long, default_value_t = 0)]
    distance: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Arc::new(Db::new(config.db_path()));
    let migrations_dir = Path::new("migrations").to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;

    let queue = TaskQueue::new(db);
    queue.submit(args.kind, &args.raw_id, args.distance).await?;

    println!(
        "Seeded {}-{} at distance {} ({} tasks queued)",
        args.kind,
        args.raw_id,
        args.distance,
        queue.depth().await?
    );
    println!("Run `degrees worker` (or `degrees serve`) to drive the traversal.");

    Ok(())
}
