use drivefs_core::path::join_path;
use drivefs_core::{normalize_path, Snapshot};

pub fn run(
    snapshot: &Snapshot,
    path: Option<String>,
    max_depth: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    for line in render(snapshot, path.as_deref().unwrap_or("/"), max_depth)? {
        println!("{}", line);
    }
    Ok(())
}

/// Render the tree under `path`, one line per entry.
///
/// Folders are only descended through their canonical path, so a hard-linked
/// folder is expanded once and shown as `name -> /canonical/path` elsewhere.
pub fn render(
    snapshot: &Snapshot,
    path: &str,
    max_depth: Option<usize>,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let path = normalize_path(path)?;
    snapshot.lookup(&path)?;

    let mut lines = vec![path.clone()];
    print_tree(snapshot, &path, "", 0, max_depth.unwrap_or(usize::MAX), &mut lines)?;
    Ok(lines)
}

fn print_tree(
    snapshot: &Snapshot,
    path: &str,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    lines: &mut Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if depth >= max_depth {
        return Ok(());
    }

    let record = snapshot.lookup(path)?;
    // Colliding siblings resolve to the first entry; show only that one
    let mut names = std::collections::HashSet::new();
    let entries: Vec<_> = snapshot
        .list_children(&record)
        .into_iter()
        .filter(|(name, _)| names.insert(name.clone()))
        .collect();

    let count = entries.len();
    for (i, (name, entry)) in entries.iter().enumerate() {
        let is_last_entry = i == count - 1;
        let connector = if is_last_entry { "└── " } else { "├── " };
        let child_path = join_path(path, name);
        let canonical = snapshot.canonical_path(entry.id());

        match canonical {
            Some(canonical) if entry.is_folder() && canonical != child_path => {
                lines.push(format!("{}{}{}/ -> {}", prefix, connector, name, canonical));
            }
            _ if entry.is_folder() => {
                lines.push(format!("{}{}{}/", prefix, connector, name));
                let new_prefix =
                    format!("{}{}", prefix, if is_last_entry { "    " } else { "│   " });
                print_tree(snapshot, &child_path, &new_prefix, depth + 1, max_depth, lines)?;
            }
            _ => lines.push(format!("{}{}{}", prefix, connector, name)),
        }
    }

    Ok(())
}
