//! Addon manifest (TOC) parsing.
//!
//! Each addon folder carries a `<Folder>.toc` file, optionally with a
//! client-variant suffix (`<Folder>_Mainline.toc`, `<Folder>-Classic.toc`).
//! Only the `## Key: Value` header lines are read.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::types::Flavor;

/// Maximum number of lines read from a manifest.
const MAX_LINES: usize = 2000;

/// Separator between folder name and variant suffix in manifest filenames.
const SUFFIX_SEPARATORS: [char; 2] = ['_', '-'];

/// Parsed manifest header data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestData {
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub interface: Option<String>,
    pub required_deps: Vec<String>,
    pub optional_deps: Vec<String>,
    /// `Some(true)` only when the manifest declares itself a library.
    pub explicit_library: Option<bool>,
    /// Variant inferred from the manifest filename or interface.
    pub flavor: Option<Flavor>,
}

impl ManifestData {
    /// Returns required and optional dependencies together.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps = self.required_deps.clone();
        for dep in &self.optional_deps {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        deps
    }
}

/// Reads manifest data for an addon folder.
pub trait ManifestParser: Send + Sync {
    /// Parses the manifest in `folder_path`, or `None` if it has none.
    fn parse(&self, folder_path: &Path) -> Option<ManifestData>;

    /// Returns true if the folder contains a recognizable manifest.
    fn has_manifest(&self, folder_path: &Path) -> bool {
        self.parse(folder_path).is_some()
    }

    /// Returns the addon name the folder's manifests declare, which may
    /// differ from the folder name.
    fn declared_name(&self, _folder_path: &Path) -> Option<String> {
        None
    }
}

/// Default TOC file parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct TocParser;

impl TocParser {
    /// Creates a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Finds the manifest file for a folder.
    ///
    /// Prefers the plain `<Folder>.toc`, then a retail-suffixed one, then
    /// any other variant suffix in name order.
    #[must_use]
    pub fn find_manifest(folder_path: &Path) -> Option<(PathBuf, Option<Flavor>)> {
        let folder = folder_path.file_name()?.to_str()?;
        let entries = fs::read_dir(folder_path).ok()?;

        let mut plain = None;
        let mut variants: Vec<(String, PathBuf, Option<Flavor>)> = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = strip_toc_extension(file_name) else {
                continue;
            };

            if stem.eq_ignore_ascii_case(folder) {
                plain = Some(path);
                continue;
            }

            if stem.len() > folder.len()
                && stem.is_char_boundary(folder.len())
                && stem[..folder.len()].eq_ignore_ascii_case(folder)
            {
                let rest = &stem[folder.len()..];
                if let Some(suffix) = rest.strip_prefix(SUFFIX_SEPARATORS) {
                    if let Some(flavor) = Flavor::from_suffix(suffix) {
                        variants.push((file_name.to_string(), path, Some(flavor)));
                    }
                }
            }
        }

        if let Some(path) = plain {
            return Some((path, None));
        }

        variants.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pos) = variants
            .iter()
            .position(|(_, _, f)| *f == Some(Flavor::Retail))
        {
            let (_, path, flavor) = variants.swap_remove(pos);
            return Some((path, flavor));
        }
        variants.into_iter().next().map(|(_, path, flavor)| (path, flavor))
    }

    /// Returns the addon name that the folder's manifest file names declare,
    /// ignoring variant suffixes.
    ///
    /// `None` when the folder has no manifest or the manifests disagree.
    #[must_use]
    pub fn addon_name(folder_path: &Path) -> Option<String> {
        let mut names: Vec<String> = fs::read_dir(folder_path)
            .ok()?
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_str()?.to_string();
                strip_toc_extension(&file_name).map(|stem| base_name(stem).to_string())
            })
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();

        match names.as_slice() {
            [name] => Some(name.clone()),
            _ => None,
        }
    }

    /// Parses manifest header lines.
    fn parse_file(path: &Path) -> Option<ManifestData> {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("[MANIFEST] Cannot open {:?}: {}", path, e);
                return None;
            }
        };

        let mut data = ManifestData::default();
        let reader = BufReader::new(file);

        for line in reader.lines().take(MAX_LINES) {
            // Malformed bytes in one line should not drop the whole manifest
            let Ok(line) = line else {
                continue;
            };
            let line = line.trim_start_matches('\u{feff}').trim();

            let Some(header) = line.strip_prefix("##") else {
                continue;
            };
            let Some((key, value)) = header.split_once(':') else {
                continue;
            };
            apply_field(&mut data, key.trim(), value.trim());
        }

        Some(data)
    }
}

impl ManifestParser for TocParser {
    fn declared_name(&self, folder_path: &Path) -> Option<String> {
        Self::addon_name(folder_path)
    }

    fn parse(&self, folder_path: &Path) -> Option<ManifestData> {
        let (path, suffix_flavor) = Self::find_manifest(folder_path)?;
        debug!("[MANIFEST] Parsing {:?}", path);

        let mut data = Self::parse_file(&path)?;
        data.flavor = suffix_flavor.or_else(|| {
            data.interface
                .as_deref()
                .and_then(Flavor::from_interface)
        });
        Some(data)
    }

    fn has_manifest(&self, folder_path: &Path) -> bool {
        Self::find_manifest(folder_path).is_some()
    }
}

/// Applies one `## Key: Value` header.
fn apply_field(data: &mut ManifestData, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }

    let lower = key.to_lowercase();
    match lower.as_str() {
        "title" => data.name = non_empty(strip_color_codes(value)),
        "version" => data.version = non_empty(value.to_string()),
        "author" => data.author = non_empty(value.to_string()),
        "interface" => data.interface = non_empty(value.to_string()),
        "dependencies" | "requireddeps" => extend_unique(&mut data.required_deps, value),
        "optionaldeps" => extend_unique(&mut data.optional_deps, value),
        "x-library" => data.explicit_library = Some(parse_bool(value)),
        "x-category" => {
            if value.eq_ignore_ascii_case("library") || value.eq_ignore_ascii_case("libraries") {
                data.explicit_library = Some(true);
            }
        }
        _ if lower.starts_with("dep") => extend_unique(&mut data.required_deps, value),
        _ => {}
    }
}

/// Strips `.toc` (case-insensitive) from a filename.
/// Drops a trailing client-variant suffix from a manifest stem.
fn base_name(stem: &str) -> &str {
    match stem.rsplit_once(|c| SUFFIX_SEPARATORS.contains(&c)) {
        Some((base, suffix)) if !base.is_empty() && Flavor::from_suffix(suffix).is_some() => base,
        _ => stem,
    }
}

fn strip_toc_extension(file_name: &str) -> Option<&str> {
    let split = file_name.len().checked_sub(4)?;
    if !file_name.is_char_boundary(split) {
        return None;
    }
    let (stem, ext) = file_name.split_at(split);
    ext.eq_ignore_ascii_case(".toc").then_some(stem)
}

/// Adds comma-separated names not already present.
fn extend_unique(target: &mut Vec<String>, value: &str) {
    for dep in value.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        if !target.iter().any(|d| d == dep) {
            target.push(dep.to_string());
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Removes `|cAARRGGBB` colour escapes and `|r` resets.
fn strip_color_codes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '|' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('c') | Some('C') => {
                chars.next();
                for _ in 0..8 {
                    if chars.next_if(char::is_ascii_hexdigit).is_none() {
                        break;
                    }
                }
            }
            Some('r') | Some('R') => {
                chars.next();
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_toc(root: &Path, folder: &str, file: &str, body: &str) -> PathBuf {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
        dir
    }

    #[test]
    fn test_addon_name_from_manifest_files() {
        let tmp = TempDir::new().unwrap();
        let dir = write_toc(tmp.path(), "Plater-Nameplates", "Plater.toc", "## Title: Plater\n");
        fs::write(dir.join("Plater_Mainline.toc"), "## Title: Plater\n").unwrap();
        fs::write(dir.join("Plater-Classic.toc"), "## Title: Plater\n").unwrap();
        assert_eq!(TocParser::addon_name(&dir).as_deref(), Some("Plater"));

        fs::write(dir.join("Other.toc"), "## Title: Other\n").unwrap();
        assert_eq!(TocParser::addon_name(&dir), None);

        let empty = tmp.path().join("Empty");
        fs::create_dir_all(&empty).unwrap();
        assert_eq!(TocParser::addon_name(&empty), None);
    }

    #[test]
    fn test_parse_basic() {
        let tmp = TempDir::new().unwrap();
        let dir = write_toc(
            tmp.path(),
            "WeakAuras",
            "WeakAuras.toc",
            "## Interface: 110002\n## Title: |cff8080ffWeakAuras|r\n## Author: The WeakAuras Team\n## Version: 5.17.0\n## Dependencies: LibStub, AceAddon-3.0\n## OptionalDeps: LibSharedMedia-3.0\n\nWeakAuras.lua\n",
        );

        let data = TocParser::new().parse(&dir).unwrap();
        assert_eq!(data.name.as_deref(), Some("WeakAuras"));
        assert_eq!(data.version.as_deref(), Some("5.17.0"));
        assert_eq!(data.author.as_deref(), Some("The WeakAuras Team"));
        assert_eq!(data.interface.as_deref(), Some("110002"));
        assert_eq!(data.required_deps, vec!["LibStub", "AceAddon-3.0"]);
        assert_eq!(data.optional_deps, vec!["LibSharedMedia-3.0"]);
        assert_eq!(data.flavor, Some(Flavor::Retail));
        assert_eq!(data.explicit_library, None);
    }

    #[test]
    fn test_variant_suffix() {
        let tmp = TempDir::new().unwrap();
        let dir = write_toc(tmp.path(), "Questie", "Questie-Classic.toc", "## Title: Questie\n");
        fs::write(dir.join("Questie_Mainline.toc"), "## Title: Questie Retail\n").unwrap();

        let data = TocParser::new().parse(&dir).unwrap();
        assert_eq!(data.name.as_deref(), Some("Questie Retail"));
        assert_eq!(data.flavor, Some(Flavor::Retail));
    }

    #[test]
    fn test_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Empty");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("readme.txt"), "hi").unwrap();

        assert!(TocParser::new().parse(&dir).is_none());
        assert!(!TocParser::new().has_manifest(&dir));
    }

    #[test]
    fn test_library_flag_and_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let dir = write_toc(
            tmp.path(),
            "LibStub",
            "LibStub.toc",
            "## Title:\n## X-Library: true\n## garbage without colon\n## Version:   \n",
        );

        let data = TocParser::new().parse(&dir).unwrap();
        assert_eq!(data.explicit_library, Some(true));
        assert!(data.name.is_none());
        assert!(data.version.is_none());
    }

    #[test]
    fn test_strip_color_codes() {
        assert_eq!(strip_color_codes("|cFF00FF00Green|r Text"), "Green Text");
        assert_eq!(strip_color_codes("Plain"), "Plain");
        assert_eq!(strip_color_codes("A || B"), "A || B");
    }

    #[test]
    fn test_dependencies_union() {
        let data = ManifestData {
            required_deps: vec!["A".to_string()],
            optional_deps: vec!["A".to_string(), "B".to_string()],
            ..ManifestData::default()
        };
        assert_eq!(data.dependencies(), vec!["A", "B"]);
    }
}
