//! Bounded breadth-first search for the addon directory.

use std::collections::VecDeque;
use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{
    ADDONS_COMPONENTS, CancellationSignal, DirectoryLocator, LocatorError, PRIMARY_MARKER,
    YIELD_INTERVAL, verify,
};

/// Progress snapshot passed to the search callback.
#[derive(Debug, Clone)]
pub struct SearchProgress<'a> {
    /// Directories visited so far.
    pub visited: usize,
    /// Directory being visited.
    pub current: &'a Path,
}

impl DirectoryLocator {
    /// Searches `root` breadth-first for the retail addon directory.
    ///
    /// Never follows symbolic links or enters ignored directories and stops
    /// `max_depth` levels below `root`. Yields to the runtime every
    /// [`YIELD_INTERVAL`] directories, checking `cancel` right before and
    /// after each yield. Returns `Ok(None)` when exhausted or cancelled.
    ///
    /// # Errors
    /// Returns [`LocatorError::UnreadableRoot`] if `root` cannot be listed.
    /// Unreadable directories below it are skipped.
    pub async fn search<F>(
        &self,
        root: &Path,
        cancel: &dyn CancellationSignal,
        mut on_progress: F,
    ) -> Result<Option<PathBuf>, LocatorError>
    where
        F: FnMut(SearchProgress<'_>),
    {
        if cancel.is_cancelled() {
            debug!("[LOCATOR] Search cancelled before start");
            return Ok(None);
        }

        let root_entries = fs::read_dir(root).map_err(|source| LocatorError::UnreadableRoot {
            path: root.to_path_buf(),
            source,
        })?;
        info!("[LOCATOR] Searching {:?}", root);

        let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
        let mut root_entries = Some(root_entries);
        queue.push_back((root.to_path_buf(), 0));
        let mut visited = 0usize;

        while let Some((dir, depth)) = queue.pop_front() {
            visited += 1;
            if visited % YIELD_INTERVAL == 0 {
                if cancel.is_cancelled() {
                    info!("[LOCATOR] Search cancelled after {} directories", visited);
                    return Ok(None);
                }
                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    info!("[LOCATOR] Search cancelled after {} directories", visited);
                    return Ok(None);
                }
            }

            on_progress(SearchProgress {
                visited,
                current: &dir,
            });

            if is_primary_variant(&dir) {
                let candidate = ADDONS_COMPONENTS
                    .iter()
                    .fold(dir.clone(), |path, part| path.join(part));
                if verify(&candidate) {
                    info!("[LOCATOR] Found {:?} after {} directories", candidate, visited);
                    return Ok(Some(candidate));
                }
            }

            if depth >= self.max_depth {
                continue;
            }

            let entries = match root_entries.take() {
                Some(entries) => entries,
                None => match fs::read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!("[LOCATOR] Skipping unreadable {:?}: {}", dir, e);
                        continue;
                    }
                },
            };
            self.enqueue_children(entries, depth + 1, &mut queue);
        }

        debug!("[LOCATOR] Search exhausted after {} directories", visited);
        Ok(None)
    }

    fn enqueue_children(
        &self,
        entries: ReadDir,
        depth: usize,
        queue: &mut VecDeque<(PathBuf, usize)>,
    ) {
        let mut children: Vec<PathBuf> = entries
            .flatten()
            // file_type() does not follow links, so symlinked dirs drop out
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|e| !e.file_name().to_str().is_some_and(|n| self.is_ignored(n)))
            .map(|e| e.path())
            .collect();
        children.sort();
        queue.extend(children.into_iter().map(|p| (p, depth)));
    }
}

fn is_primary_variant(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(PRIMARY_MARKER))
}
