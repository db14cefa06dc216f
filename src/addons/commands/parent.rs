//! Parent folder selection for multi-folder packages.

use tracing::debug;

/// Picks the folder that owns the rest of a package.
///
/// One folder is its own parent. Otherwise a folder matching the package
/// display name (case, whitespace and punctuation ignored) wins, then the
/// shortest name, ties broken alphabetically.
///
/// # Panics
/// Panics if `folders` is empty.
#[must_use]
pub fn determine_parent(folders: &[String], display_name: Option<&str>) -> String {
    assert!(
        !folders.is_empty(),
        "Parent determination needs at least one folder"
    );

    if folders.len() == 1 {
        return folders[0].clone();
    }

    if let Some(wanted) = display_name.map(normalize).filter(|n| !n.is_empty()) {
        if let Some(found) = folders.iter().find(|f| normalize(f) == wanted) {
            debug!("[PARENT] '{}' matches the package name", found);
            return found.clone();
        }
    }

    let shortest = folders.iter().skip(1).fold(&folders[0], |best, f| {
        if (f.len(), f) < (best.len(), best) { f } else { best }
    });

    // Prefix coverage is only reported; the shortest name is used either way
    let sharing = folders
        .iter()
        .filter(|f| f.starts_with(shortest.as_str()))
        .count();
    if sharing * 2 >= folders.len() {
        debug!(
            "[PARENT] '{}' prefixes {} of {} folders",
            shortest,
            sharing,
            folders.len()
        );
    } else {
        debug!(
            "[PARENT] '{}' prefixes only {} of {} folders, using it anyway",
            shortest,
            sharing,
            folders.len()
        );
    }

    shortest.clone()
}

/// Lowercases and drops everything but letters and digits.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
