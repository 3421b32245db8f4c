use drivefs_remote::SyncEngine;

pub fn run(engine: &SyncEngine) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = engine.snapshot();
    let summary = snapshot.summary();
    let stats = engine.stats();

    println!("Root:        {}", snapshot.root().id());
    println!("Records:     {}", snapshot.len());
    println!("Reachable:   {}", summary.reachable);
    println!("Aliases:     {}", summary.aliases);
    println!("Collisions:  {}", summary.collisions);
    println!("Unreachable: {}", summary.unreachable);
    match snapshot.change_id() {
        Some(id) => println!("Change id:   {}", id),
        None => println!("Change id:   -"),
    }
    println!(
        "Built at:    {}",
        snapshot.built_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    println!("Poll every:  {:?}", engine.settings().poll_interval);
    println!("Refreshes:   {}", stats.full_refreshes);
    println!("Failures:    {}", stats.failures);
    if let Some(err) = &stats.last_error {
        println!("Last error:  {}", err);
    }

    Ok(())
}
