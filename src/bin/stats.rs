use degrees::db::Db;
use degrees::error::DegreesError;
use degrees::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let db = Db::new(config.db_path());

    println!("\n=== degrees traversal statistics ===\n");

    let (node_count, expanded_count, adjacency_count, queue_depth) = db
        .with_connection(|conn| {
            let node_count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
            let expanded_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE expanded = 1",
                [],
                |r| r.get(0),
            )?;
            let adjacency_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM adjacencies", [], |r| r.get(0))?;
            let queue_depth: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))?;
            Ok::<_, DegreesError>((node_count, expanded_count, adjacency_count, queue_depth))
        })
        .await?;

    println!("Discovered nodes:  {}", node_count);
    println!("  fully expanded:  {}", expanded_count);
    println!("Adjacency records: {}", adjacency_count);
    println!("Queued tasks:      {}", queue_depth);

    // Distance histogram
    let histogram = db
        .with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, distance, COUNT(*) FROM nodes GROUP BY kind, distance ORDER BY distance, kind",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ));
            }
            Ok::<Vec<_>, DegreesError>(results)
        })
        .await?;

    if histogram.is_empty() {
        println!("\nNo nodes discovered yet. Seed a traversal first.");
    } else {
        println!("\nNodes by distance:");
        for (kind, distance, count) in &histogram {
            println!("  distance {:>3}  {:<7} {}", distance, kind, count);
        }
    }

    // Retry pressure: tasks that have already failed at least once
    let retrying = db
        .with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE attempts > 0",
                [],
                |r| r.get::<_, i64>(0),
            )
            .map_err(DegreesError::Database)
        })
        .await?;

    if retrying > 0 {
        println!("\n{} queued tasks are awaiting a retry.", retrying);
    }

    Ok(())
}
