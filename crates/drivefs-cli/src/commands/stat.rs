use drivefs_core::Snapshot;

pub fn run(snapshot: &Snapshot, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = snapshot.lookup(path)?;
    let format = "%Y-%m-%d %H:%M:%S UTC";

    println!("Path:      {}", path);
    println!("Id:        {}", record.id());
    println!("Name:      {}", record.display_name());
    println!("Type:      {}", if record.is_folder() { "directory" } else { "file" });
    println!("Size:      {} bytes", record.size_in_bytes());
    println!("Parents:   {}", record.parent_ids().join(", "));
    if let Some(canonical) = snapshot.canonical_path(record.id()) {
        if canonical != path {
            println!("Canonical: {}", canonical);
        }
    }
    println!("Modified:  {}", record.modify_time().format(format));
    println!("Created:   {}", record.create_time().format(format));
    println!("Accessed:  {}", record.access_time().format(format));

    Ok(())
}
