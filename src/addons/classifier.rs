//! Addon/library classification.
//!
//! Heuristic only. Callers go through [`KindClassifier`] so a different
//! heuristic can be substituted without touching the reconciler.

use super::types::AddonKind;

/// Shared-library family prefixes recognised by name.
const LIBRARY_FAMILIES: &[&str] = &[
    "Ace3",
    "AceAddon",
    "AceComm",
    "AceConfig",
    "AceConsole",
    "AceDB",
    "AceEvent",
    "AceGUI",
    "AceHook",
    "AceLocale",
    "AceSerializer",
    "AceTimer",
    "CallbackHandler",
    "HereBeDragons",
    "LibStub",
    "TaintLess",
    "UTF8",
];

/// Confidence attached to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Flags read from the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestFlags {
    /// `Some(true)` when the manifest declares itself a library.
    pub explicit_library: Option<bool>,
}

/// Dependency-graph facts about a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphFacts {
    /// Some other folder depends on this one.
    pub has_dependents: bool,
    /// This folder declares dependencies.
    pub has_dependencies: bool,
}

/// Result of classifying a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: AddonKind,
    pub confidence: Confidence,
    pub reason: &'static str,
}

/// Classifies a folder as addon or library.
pub trait KindClassifier: Send + Sync {
    /// Must be deterministic and free of side effects.
    fn classify(&self, name: &str, flags: ManifestFlags, graph: GraphFacts) -> Classification;
}

/// Default rule-ordered heuristic.
///
/// 1. Explicit library flag: library, high.
/// 2. Library-style name: library, medium. An explicit `false` flag only
///    means "not declared" and does not block this rule.
/// 3. No dependencies but at least one dependent: library, low.
/// 4. Otherwise addon.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl KindClassifier for HeuristicClassifier {
    fn classify(&self, name: &str, flags: ManifestFlags, graph: GraphFacts) -> Classification {
        if flags.explicit_library == Some(true) {
            return Classification {
                kind: AddonKind::Library,
                confidence: Confidence::High,
                reason: "manifest declares library",
            };
        }

        if is_library_name(name) {
            return Classification {
                kind: AddonKind::Library,
                confidence: Confidence::Medium,
                reason: "name matches library convention",
            };
        }

        if !graph.has_dependencies && graph.has_dependents {
            return Classification {
                kind: AddonKind::Library,
                confidence: Confidence::Low,
                reason: "depended upon with no dependencies",
            };
        }

        Classification {
            kind: AddonKind::Addon,
            confidence: Confidence::Medium,
            reason: "no library indicators",
        }
    }
}

/// Returns true if the name follows a library naming convention.
///
/// Matches version-suffixed names (`LibDBIcon-1.0`, `AceGUI-3.0`), the
/// `Lib` prefix followed by a capital, digit or separator (`LibDeflate`,
/// `Lib_Foo`), and known library families.
#[must_use]
pub fn is_library_name(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }

    if has_version_suffix(name) {
        return true;
    }

    if let Some(rest) = name.strip_prefix("Lib") {
        match rest.chars().next() {
            None => return true,
            Some(c) if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_' => {
                return true;
            }
            _ => {}
        }
    }

    LIBRARY_FAMILIES.iter().any(|family| {
        name.len() >= family.len()
            && name.is_char_boundary(family.len())
            && name[..family.len()].eq_ignore_ascii_case(family)
            && name[family.len()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_ascii_lowercase())
    })
}

/// Matches a trailing `-<digits>.<digits>` (optionally more dot groups).
fn has_version_suffix(name: &str) -> bool {
    let Some((_, suffix)) = name.rsplit_once('-') else {
        return false;
    };
    let mut groups = suffix.split('.');
    let valid_group = |g: &str| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit());

    match (groups.next(), groups.next()) {
        (Some(major), Some(minor)) if valid_group(major) && valid_group(minor) => {
            groups.all(valid_group)
        }
        _ => false,
    }
}
