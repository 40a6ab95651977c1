//! Zip expansion on the blocking pool.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EXTRACT_PROGRESS_INTERVAL;
use crate::error::{IoResultExt, ProvisionError, ProvisionResult};
use crate::server::types::ProgressReporter;

/// `(entries_done, entries_total)`
pub type EntryCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Clone)]
pub struct ExpandOptions {
    pub on_entry: Option<EntryCallback>,
    /// Paths relative to the destination (forward slashes) that are kept when they
    /// already exist there.
    pub preserve: Vec<String>,
    /// Callback cadence in entries
    pub interval: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            on_entry: None,
            preserve: Vec::new(),
            interval: EXTRACT_PROGRESS_INTERVAL,
        }
    }
}

impl ExpandOptions {
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn with_callback(mut self, callback: EntryCallback) -> Self {
        self.on_entry = Some(callback);
        self
    }

    pub fn preserving<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Entry callback that forwards counts to a progress reporter.
pub fn report_entries(reporter: Arc<dyn ProgressReporter>) -> EntryCallback {
    Arc::new(move |done: usize, total: usize| {
        let percent = if total == 0 {
            None
        } else {
            Some(((done.min(total) * 100) / total) as u8)
        };
        reporter.update_progress(done as u64, Some(total as u64), percent);
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandReport {
    pub entries: usize,
    pub files_written: usize,
    /// Entries whose path would land outside the destination
    pub skipped_unsafe: usize,
    /// Existing files left untouched because they were listed in `preserve`
    pub preserved: usize,
}

/// Extract `archive` into `dest`. Existing content is never deleted; files in the
/// archive overwrite same-named files unless preserved.
pub async fn expand(
    archive: &Path,
    dest: &Path,
    options: ExpandOptions,
) -> ProvisionResult<ExpandReport> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    let archive_for_err = archive.clone();

    tokio::task::spawn_blocking(move || expand_blocking(&archive, &dest, &options))
        .await
        .map_err(|e| {
            ProvisionError::extraction(&archive_for_err, format!("extraction task failed: {}", e))
        })?
}

fn expand_blocking(
    archive_path: &Path,
    dest: &Path,
    options: &ExpandOptions,
) -> ProvisionResult<ExpandReport> {
    log::info!("Extracting {:?} -> {:?}", archive_path, dest);

    let file = File::open(archive_path).at_path(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ProvisionError::DownloadIntegrityFailure {
            path: archive_path.to_path_buf(),
            detail: format!("not a readable zip archive: {}", e),
        })?;
    std::fs::create_dir_all(dest).at_path(dest)?;

    let total = archive.len();
    let interval = options.interval.max(1);
    let mut report = ExpandReport {
        entries: total,
        ..ExpandReport::default()
    };

    for i in 0..total {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ProvisionError::extraction(archive_path, e))?;

        let relative: PathBuf = match entry.enclosed_name() {
            Some(name) => name,
            None => {
                log::warn!("Skipping unsafe archive entry {:?}", entry.name());
                report.skipped_unsafe += 1;
                notify(options, i + 1, total, interval);
                continue;
            }
        };
        let outpath = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| ProvisionError::extraction(archive_path, e))?;
        } else if is_preserved(options, &relative) && outpath.exists() {
            log::debug!("Keeping existing {:?}", outpath);
            report.preserved += 1;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ProvisionError::extraction(archive_path, e))?;
            }
            let mut outfile =
                File::create(&outpath).map_err(|e| ProvisionError::extraction(archive_path, e))?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| ProvisionError::extraction(archive_path, e))?;
            report.files_written += 1;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode & 0o7777))
                        .map_err(|e| ProvisionError::extraction(archive_path, e))?;
                }
            }
        }

        notify(options, i + 1, total, interval);
    }

    if let Some(callback) = &options.on_entry {
        callback(total, total);
    }

    log::debug!(
        "Extraction complete: {} entries, {} files, {} unsafe skipped, {} preserved",
        report.entries,
        report.files_written,
        report.skipped_unsafe,
        report.preserved
    );
    Ok(report)
}

fn notify(options: &ExpandOptions, done: usize, total: usize, interval: usize) {
    // the final call happens once after the loop
    if done % interval == 0 && done != total {
        if let Some(callback) = &options.on_entry {
            callback(done, total);
        }
    }
}

fn is_preserved(options: &ExpandOptions, relative: &Path) -> bool {
    let normalized = relative.to_string_lossy().replace('\\', "/");
    options.preserve.iter().any(|p| p == &normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::write_zip;
    use std::sync::Mutex;

    #[tokio::test]
    async fn traversal_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_zip(
            &archive,
            &[
                ("../escaped.txt", "nope"),
                ("nested/../../also-escaped.txt", "nope"),
                ("ok/inside.txt", "yes"),
            ],
        );
        let dest = tmp.path().join("out");

        let report = expand(&archive, &dest, ExpandOptions::default()).await.unwrap();

        assert_eq!(report.skipped_unsafe, 2);
        assert_eq!(report.files_written, 1);
        assert!(dest.join("ok/inside.txt").exists());
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn preserved_files_are_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bedrock.zip");
        write_zip(
            &archive,
            &[
                ("server.properties", "level-name=Default"),
                ("bedrock_server", "ELF"),
            ],
        );
        let dest = tmp.path().join("srv");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("server.properties"), "level-name=Mine").unwrap();

        let options = ExpandOptions::default().preserving(["server.properties"]);
        let report = expand(&archive, &dest, options).await.unwrap();

        assert_eq!(report.preserved, 1);
        assert_eq!(
            std::fs::read_to_string(dest.join("server.properties")).unwrap(),
            "level-name=Mine"
        );
        assert!(dest.join("bedrock_server").exists());
    }

    #[tokio::test]
    async fn callback_fires_on_interval_and_at_end() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("many.zip");
        let names: Vec<String> = (0..5).map(|i| format!("f{}.txt", i)).collect();
        let entries: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "x")).collect();
        write_zip(&archive, &entries);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let options = ExpandOptions::default()
            .with_interval(2)
            .with_callback(Arc::new(move |done: usize, total: usize| sink.lock().unwrap().push((done, total))));

        expand(&archive, &tmp.path().join("out"), options).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn garbage_is_an_integrity_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, "<html>403 Forbidden</html>").unwrap();

        let err = expand(&archive, &tmp.path().join("out"), ExpandOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DownloadIntegrityFailure { .. }));
    }
}
