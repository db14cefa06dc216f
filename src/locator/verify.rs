//! Structural check of a candidate addon directory.

use std::path::{Component, Path};

use tracing::debug;

use super::{ADDONS_COMPONENTS, NON_PRIMARY_MARKERS, PRIMARY_MARKER};

/// Minimum number of corroborating artifacts.
const MIN_ARTIFACTS: usize = 2;

/// Returns true if `path` looks like the retail client's addon directory.
///
/// Checks, without reading any manifest:
/// - the path exists
/// - no component is a non-primary variant marker
/// - a `_retail_` component is followed by `Interface/AddOns`
/// - at least two install artifacts exist around the variant root
///
/// Component names compare case-insensitively.
#[must_use]
pub fn verify(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }

    let components: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str().map(str::to_lowercase),
            _ => None,
        })
        .collect();

    if components
        .iter()
        .any(|c| NON_PRIMARY_MARKERS.contains(&c.as_str()))
    {
        debug!("[LOCATOR] {:?} is not a retail path", path);
        return false;
    }

    let Some(marker) = components.iter().position(|c| c == PRIMARY_MARKER) else {
        return false;
    };

    let wanted = ADDONS_COMPONENTS.map(|c| c.to_lowercase());
    let has_addons = components[marker + 1..]
        .windows(2)
        .any(|pair| pair[0] == wanted[0] && pair[1] == wanted[1]);
    if !has_addons {
        return false;
    }

    let Some(variant_root) = path.ancestors().find(|a| {
        a.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(PRIMARY_MARKER))
    }) else {
        return false;
    };
    let Some(install_root) = variant_root.parent() else {
        return false;
    };

    let artifacts = [
        install_root.join(".build.info"),
        install_root.join("Data"),
        variant_root.join("Wow.exe"),
        variant_root.join("Wow-64.exe"),
        variant_root.join("World of Warcraft.app"),
    ];
    let present = artifacts.iter().filter(|a| a.exists()).count();
    debug!(
        "[LOCATOR] {:?}: {} of {} artifacts present",
        path,
        present,
        artifacts.len()
    );

    present >= MIN_ARTIFACTS
}
