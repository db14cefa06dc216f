//! Version control through the `git` command-line tool.

use std::path::Path;
use std::process::{Command, Output};

use tracing::{debug, info, warn};

use super::VersionControlClient;
use crate::addons::AddonError;

/// Maximum stderr characters carried into an error message.
const MAX_ERROR_OUTPUT: usize = 500;

/// `git` executable wrapper.
#[derive(Debug, Clone)]
pub struct GitCli {
    /// Executable name or path.
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Creates a wrapper around `git` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Uses a specific git executable.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        let program = program.into();
        assert!(!program.is_empty(), "git program must not be empty");
        Self { program }
    }

    fn run(&self, args: &[&str]) -> Result<Output, AddonError> {
        debug!("[GIT] {} {}", self.program, args.join(" "));
        Command::new(&self.program)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| AddonError::Validation(format!("Failed to run {}: {}", self.program, e)))
    }
}

impl VersionControlClient for GitCli {
    fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<(), AddonError> {
        assert!(!url.is_empty(), "URL must not be empty");

        let dest_str = dest.to_string_lossy();
        let mut args = vec!["clone", "--depth", "1", "--single-branch"];
        if let Some(branch) = branch {
            args.push("--branch");
            args.push(branch);
        }
        args.push(url);
        args.push(&*dest_str);

        info!("[GIT] Cloning {} into {:?}", url, dest);
        let output = self.run(&args)?;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(MAX_ERROR_OUTPUT)
                .collect();
            warn!("[GIT] Clone failed: {}", stderr.trim());
            if stderr.contains("not found") || stderr.contains("Could not find remote branch") {
                return Err(AddonError::NotFound(format!("{}: {}", url, stderr.trim())));
            }
            return Err(AddonError::Network(format!(
                "git clone failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }

    fn remote_revision(&self, url: &str, branch: Option<&str>) -> Option<String> {
        let reference = branch.map_or_else(|| "HEAD".to_string(), |b| format!("refs/heads/{}", b));
        let output = match self.run(&["ls-remote", url, &reference]) {
            Ok(o) if o.status.success() => o,
            Ok(o) => {
                warn!(
                    "[GIT] ls-remote failed: {}",
                    String::from_utf8_lossy(&o.stderr).trim()
                );
                return None;
            }
            Err(e) => {
                warn!("[GIT] {}", e);
                return None;
            }
        };

        parse_ls_remote(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Takes the revision from the first `ls-remote` line.
fn parse_ls_remote(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .filter(|rev| !rev.is_empty() && rev.chars().all(|c| c.is_ascii_hexdigit()))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote() {
        let out = "3f1c2a9d0b7e4f6a8c5d2e1f0a9b8c7d6e5f4a3b\tHEAD\n";
        assert_eq!(
            parse_ls_remote(out).as_deref(),
            Some("3f1c2a9d0b7e4f6a8c5d2e1f0a9b8c7d6e5f4a3b")
        );
        assert_eq!(parse_ls_remote(""), None);
        assert_eq!(parse_ls_remote("fatal: nope"), None);
    }

    #[test]
    fn test_missing_program() {
        let git = GitCli::with_program("definitely-not-a-git-binary-12345");
        let tmp = std::env::temp_dir().join("addonkeeper-git-test");
        assert!(matches!(
            git.clone_repo("https://github.com/a/b.git", None, &tmp),
            Err(AddonError::Validation(_))
        ));
        assert!(git.remote_revision("https://github.com/a/b.git", None).is_none());
    }
}
