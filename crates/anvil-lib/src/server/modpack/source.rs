use std::path::{Path, PathBuf};

use crate::config::{join_url, ProvisionerConfig};
use crate::error::{ProvisionError, ProvisionResult};
use crate::models::api::modrinth::ProjectVersion;
use crate::server::core::downloader::Downloader;
use crate::server::types::SoftwareType;

const DEFAULT_ARCHIVE_NAME: &str = "modpack.zip";

/// Where a modpack archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModpackSource {
    Url(String),
    LocalPath(PathBuf),
    /// Modrinth project id or slug
    Modrinth(String),
}

impl ModpackSource {
    /// http(s) URLs, then existing paths, then anything that looks like a Modrinth slug.
    pub fn parse(raw: &str) -> ProvisionResult<Self> {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(ModpackSource::Url(raw.to_string()));
        }
        let path = Path::new(raw);
        if path.is_file() {
            return Ok(ModpackSource::LocalPath(path.to_path_buf()));
        }
        if is_modrinth_slug(raw) {
            return Ok(ModpackSource::Modrinth(raw.to_string()));
        }
        Err(ProvisionError::InvalidRequest(format!(
            "modpack source {:?} is neither a URL, an existing file nor a Modrinth project",
            raw
        )))
    }
}

fn is_modrinth_slug(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= 64
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A source narrowed down to something fetchable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Remote { url: String, file_name: String },
    Local(PathBuf),
}

/// An archive on disk, and whether provisioning created it (and may delete it).
#[derive(Debug, Clone)]
pub struct SourcedArchive {
    pub path: PathBuf,
    pub owned: bool,
}

/// Look up the download for `source`. Modrinth projects pick the newest version,
/// restricted to `mc_version` when one is given.
pub async fn resolve(
    source: &ModpackSource,
    downloader: &Downloader,
    config: &ProvisionerConfig,
    mc_version: Option<&str>,
) -> ProvisionResult<ResolvedSource> {
    match source {
        ModpackSource::Url(url) => Ok(ResolvedSource::Remote {
            file_name: archive_name_from_url(url),
            url: url.clone(),
        }),
        ModpackSource::LocalPath(path) => Ok(ResolvedSource::Local(path.clone())),
        ModpackSource::Modrinth(project) => {
            let url = join_url(
                &config.modrinth_api_url,
                &format!("project/{}/version", project),
            );
            let versions: Vec<ProjectVersion> = downloader.get_json(&url).await?;
            let version = versions
                .iter()
                .find(|v| mc_version.map_or(true, |mc| v.game_versions.iter().any(|g| g == mc)))
                .ok_or_else(|| ProvisionError::UpstreamVersionNotFound {
                    software: SoftwareType::ModpackZip,
                    requested: project.clone(),
                    detail: match mc_version {
                        Some(mc) => format!("no version of the project supports Minecraft {}", mc),
                        None => "the project has no published versions".to_string(),
                    },
                })?;
            let file = version
                .files
                .iter()
                .find(|f| f.primary)
                .or_else(|| version.files.first())
                .ok_or_else(|| ProvisionError::UpstreamVersionNotFound {
                    software: SoftwareType::ModpackZip,
                    requested: format!("{} {}", project, version.version_number),
                    detail: "version has no files".to_string(),
                })?;
            log::info!(
                "Modrinth project {} -> version {} ({})",
                project,
                version.version_number,
                file.filename
            );
            Ok(ResolvedSource::Remote {
                url: file.url.clone(),
                file_name: sanitize_archive_name(&file.filename),
            })
        }
    }
}

/// Last path segment of `url`, made safe to use as a file name.
pub fn archive_name_from_url(url: &str) -> String {
    let segment = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
        })
        .unwrap_or_default();
    sanitize_archive_name(&segment)
}

fn sanitize_archive_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let lower = cleaned.to_ascii_lowercase();
    if cleaned.starts_with('.') || !(lower.ends_with(".zip") || lower.ends_with(".mrpack")) {
        DEFAULT_ARCHIVE_NAME.to_string()
    } else {
        cleaned
    }
}
