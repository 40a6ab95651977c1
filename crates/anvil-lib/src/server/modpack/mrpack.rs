use std::path::{Component, Path, PathBuf};

use super::types::ModrinthIndex;
use crate::error::ProvisionResult;
use crate::server::core::downloader::Downloader;
use crate::server::types::ProgressReporter;

/// Download every index file the server side needs into `dest`.
/// Returns the number of files fetched.
pub async fn download_server_files(
    index: &ModrinthIndex,
    dest: &Path,
    downloader: &Downloader,
    reporter: &dyn ProgressReporter,
) -> ProvisionResult<usize> {
    let wanted: Vec<_> = index.files.iter().filter(|f| f.wanted_on_server()).collect();
    log::info!(
        "Downloading {} of {} pack files for the server",
        wanted.len(),
        index.files.len()
    );

    let mut fetched = 0;
    for (i, file) in wanted.iter().enumerate() {
        let Some(relative) = safe_relative(&file.path) else {
            log::warn!("Skipping pack file with unsafe path {:?}", file.path);
            continue;
        };
        let Some(url) = file.downloads.first() else {
            log::warn!("Pack file {} has no download URL", file.path);
            continue;
        };

        reporter.set_status(&format!(
            "Downloading pack file {}/{}: {}",
            i + 1,
            wanted.len(),
            file.path
        ));
        downloader
            .download_verified(
                url,
                &dest.join(relative),
                file.hashes.get("sha1").map(|s| s.as_str()),
                reporter,
            )
            .await?;
        fetched += 1;
    }
    Ok(fetched)
}

/// `path` as a relative path that stays inside its root, or None.
pub fn safe_relative(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_paths_are_rejected() {
        assert_eq!(safe_relative("mods/sodium.jar"), Some(PathBuf::from("mods/sodium.jar")));
        assert_eq!(safe_relative("./config/a.toml"), Some(PathBuf::from("config/a.toml")));
        assert_eq!(safe_relative("../outside.jar"), None);
        assert_eq!(safe_relative("mods/../../x"), None);
        assert_eq!(safe_relative("/etc/passwd"), None);
        assert_eq!(safe_relative(""), None);
    }
}
