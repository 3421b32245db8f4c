use drivefs_core::Snapshot;

pub fn run(snapshot: &Snapshot, path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.as_deref().unwrap_or("/");
    let record = snapshot.lookup(path)?;

    if !record.is_folder() {
        println!("- {:>8}  {}", format_size(record.size_in_bytes()), record.escaped_name());
        return Ok(());
    }

    let entries = snapshot.list_children(&record);
    if entries.is_empty() {
        println!("(empty)");
        return Ok(());
    }

    for (name, entry) in entries {
        let type_indicator = if entry.is_folder() { "d" } else { "-" };
        let size = if entry.is_folder() {
            "-".to_string()
        } else {
            format_size(entry.size_in_bytes())
        };

        println!("{} {:>8}  {}", type_indicator, size, name);
    }

    Ok(())
}

pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}G", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}
