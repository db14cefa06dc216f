//! HTTP archive download and zip extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{ArchiveFetcher, http_client};
use crate::addons::AddonError;

/// Maximum number of entries extracted from one archive.
const MAX_ARCHIVE_ENTRIES: usize = 20_000;

/// Downloads archives with `reqwest` and extracts them with `zip`.
pub struct HttpArchiveFetcher {
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl Default for HttpArchiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpArchiveFetcher {
    /// Creates a new fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<(), AddonError> {
        assert!(!url.is_empty(), "URL must not be empty");

        info!("[ARCHIVE] Downloading {}", url);
        let start = Instant::now();

        let mut response = self.client.get(url).send().map_err(|e| {
            warn!("[ARCHIVE] HTTP request failed: {}", e);
            AddonError::Network(e.to_string())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AddonError::NotFound(format!("Download not found: {}", url)));
        }
        if !status.is_success() {
            return Err(AddonError::Network(format!("Download failed: {}", status)));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(dest)?;
        let bytes = response
            .copy_to(&mut out)
            .map_err(|e| AddonError::Network(format!("Failed to read response: {}", e)))?;

        info!("[ARCHIVE] Downloaded {} bytes in {:?}", bytes, start.elapsed());
        Ok(())
    }

    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), AddonError> {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| AddonError::Filesystem(format!("Failed to open archive: {}", e)))?;

        if zip.len() > MAX_ARCHIVE_ENTRIES {
            return Err(AddonError::Filesystem(format!(
                "Archive has too many entries ({})",
                zip.len()
            )));
        }

        fs::create_dir_all(dest_dir)?;

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| {
                AddonError::Filesystem(format!("Failed to read archive entry: {}", e))
            })?;

            // Rejects absolute paths and `..` components
            let Some(relative) = entry.enclosed_name() else {
                warn!("[ARCHIVE] Skipping unsafe entry: {}", entry.name());
                continue;
            };
            let outpath = dest_dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&outpath)?;
            } else {
                if let Some(parent) = outpath.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut outfile = File::create(&outpath)?;
                io::copy(&mut entry, &mut outfile)?;
            }
        }

        debug!("[ARCHIVE] Extracted {} entries to {:?}", zip.len(), dest_dir);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_extract() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("pkg.zip");

        {
            let file = File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default();
            writer.add_directory("Details/", options).unwrap();
            writer.start_file("Details/Details.toc", options).unwrap();
            writer.write_all(b"## Title: Details\n").unwrap();
            writer.start_file("../evil.txt", options).unwrap();
            writer.write_all(b"nope").unwrap();
            writer.finish().unwrap();
        }

        let out = tmp.path().join("out");
        HttpArchiveFetcher::new().extract(&archive_path, &out).unwrap();

        assert!(out.join("Details").join("Details.toc").is_file());
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn test_extract_not_a_zip() {
        let tmp = TempDir::new().unwrap();
        let bogus = tmp.path().join("bogus.zip");
        fs::write(&bogus, "not a zip").unwrap();

        let result = HttpArchiveFetcher::new().extract(&bogus, &tmp.path().join("out"));
        assert!(matches!(result, Err(AddonError::Filesystem(_))));
    }
}
