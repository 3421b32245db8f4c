use drivefs_core::path::join_path;
use drivefs_core::{normalize_path, Snapshot};
use regex::Regex;

pub fn run(
    snapshot: &Snapshot,
    path: Option<String>,
    pattern: &str,
    file_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let regex = Regex::new(pattern)?;
    let path = normalize_path(path.as_deref().unwrap_or("/"))?;

    for found in find(snapshot, &path, &regex, file_type.as_deref())? {
        println!("{}", found);
    }

    Ok(())
}

/// Paths under `path` whose display name matches `pattern`. Each record is
/// reported once, under the path it was first reached by.
pub fn find(
    snapshot: &Snapshot,
    path: &str,
    pattern: &Regex,
    type_filter: Option<&str>,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut found = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let record = snapshot.lookup(path)?;
    seen.insert(record.id().to_string());
    find_recursive(snapshot, path, pattern, type_filter, &mut seen, &mut found)?;
    Ok(found)
}

fn find_recursive(
    snapshot: &Snapshot,
    path: &str,
    pattern: &Regex,
    type_filter: Option<&str>,
    seen: &mut std::collections::HashSet<String>,
    found: &mut Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = snapshot.lookup(path)?;
    let mut names = std::collections::HashSet::new();

    for (name, entry) in snapshot.list_children(&record) {
        if !names.insert(name.clone()) {
            continue;
        }
        if !seen.insert(entry.id().to_string()) {
            continue;
        }
        let full_path = join_path(path, &name);

        let matches_type = match type_filter {
            Some("f") | Some("file") => !entry.is_folder(),
            Some("d") | Some("dir") => entry.is_folder(),
            _ => true,
        };

        if matches_type && pattern.is_match(entry.display_name()) {
            found.push(full_path.clone());
        }

        if entry.is_folder() {
            find_recursive(snapshot, &full_path, pattern, type_filter, seen, found)?;
        }
    }

    Ok(())
}
