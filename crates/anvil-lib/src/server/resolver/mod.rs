//! Turns "Paper latest" or "Forge recommended for 1.20.1" into a concrete download.
//!
//! "Most recent" is positional: each upstream list is taken in the order it is
//! served. Only the scraped Bedrock feed is sorted here.

pub mod bedrock;
pub mod cache;

use std::sync::Arc;

use crate::config::{fill_template, join_url, ProvisionerConfig};
use crate::error::{ProvisionError, ProvisionResult};
use crate::models::api::fabric::{GameVersion, InstallerVersion, LoaderForGame};
use crate::models::api::forge::{MavenMetadata, PromotionsSlim};
use crate::models::api::paper::{PaperProject, PaperVersion, PurpurProject, PurpurVersion};
use crate::models::api::vanilla::{VersionDetails, VersionManifest};
use crate::server::core::downloader::Downloader;
use crate::server::core::traits::BuildIdValidator;
use crate::server::core::validator::ensure_valid;
use crate::server::types::{is_latest, SoftwareType};
use crate::utils::version::{compare_versions, minecraft_minor};

pub use cache::{Clock, ManualClock, SystemClock, VersionCache, VersionCacheEntry};

/// A concrete artifact to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub url: String,
    /// Concrete upstream version (Minecraft version, or Bedrock build)
    pub version: String,
    /// Build or loader version, where the software has one
    pub build: Option<String>,
    /// File name to store the artifact under
    pub file_name: String,
    pub sha1: Option<String>,
}

pub struct VersionResolver {
    config: Arc<ProvisionerConfig>,
    downloader: Arc<Downloader>,
    validator: Arc<dyn BuildIdValidator>,
    clock: Arc<dyn Clock>,
    bedrock_cache: VersionCache,
}

fn not_found(software: SoftwareType, requested: &str, detail: impl Into<String>) -> ProvisionError {
    ProvisionError::UpstreamVersionNotFound {
        software,
        requested: requested.to_string(),
        detail: detail.into(),
    }
}

/// A build the caller asked for explicitly, as opposed to "latest".
fn explicit(build: Option<&str>) -> Option<&str> {
    build.filter(|b| !is_latest(b))
}

impl VersionResolver {
    pub fn new(
        config: Arc<ProvisionerConfig>,
        downloader: Arc<Downloader>,
        validator: Arc<dyn BuildIdValidator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bedrock_cache = VersionCache::new(config.version_cache_ttl());
        Self {
            config,
            downloader,
            validator,
            clock,
            bedrock_cache,
        }
    }

    /// Resolve `version` (and optional `build`) of `software` to a download.
    pub async fn resolve(
        &self,
        software: SoftwareType,
        version: &str,
        build: Option<&str>,
    ) -> ProvisionResult<ResolvedArtifact> {
        // vanilla ids are only looked up in the manifest, never spliced into a URL
        if software != SoftwareType::Vanilla && !is_latest(version) {
            ensure_valid(self.validator.as_ref(), version)?;
        }
        if let Some(build) = explicit(build) {
            ensure_valid(self.validator.as_ref(), build)?;
        }
        log::info!(
            "Resolving {} {} (build {})",
            software,
            version,
            build.unwrap_or("latest")
        );

        let artifact = match software {
            SoftwareType::Vanilla => self.vanilla(version).await?,
            SoftwareType::Paper => self.paper(version, explicit(build)).await?,
            SoftwareType::Purpur => self.purpur(version, explicit(build)).await?,
            SoftwareType::Spigot => self.spigot(version).await?,
            SoftwareType::Fabric => self.fabric(version, explicit(build)).await?,
            SoftwareType::Forge => self.forge(version, explicit(build)).await?,
            SoftwareType::NeoForge => self.neoforge(version, explicit(build)).await?,
            SoftwareType::Bedrock => self.bedrock(version).await?,
            SoftwareType::ModpackZip => {
                return Err(ProvisionError::InvalidRequest(
                    "modpacks are resolved from their source, not a version".to_string(),
                ))
            }
        };

        log::info!(
            "Resolved {} {} -> {} ({})",
            software,
            version,
            artifact.version,
            artifact.url
        );
        Ok(artifact)
    }

    /// The Bedrock version feed, served from cache while it is younger than the TTL.
    ///
    /// When every locale page fails the configured fallback versions are returned;
    /// they are not cached, so the next call tries the network again.
    pub async fn bedrock_versions(&self) -> ProvisionResult<VersionCacheEntry> {
        if let Some(entry) = self.bedrock_cache.get(self.clock.now()) {
            return Ok(entry);
        }

        if let Some(versions) = bedrock::fetch_versions(&self.downloader, &self.config).await {
            let entry = VersionCacheEntry {
                latest: versions[0].clone(),
                versions,
                fetched_at: self.clock.now(),
            };
            self.bedrock_cache.store(entry.clone());
            return Ok(entry);
        }

        let fallback = &self.config.bedrock_fallback_versions;
        match fallback.first() {
            Some(latest) => {
                log::warn!(
                    "All Bedrock download pages failed, using last-known-good {}",
                    latest
                );
                Ok(VersionCacheEntry {
                    latest: latest.clone(),
                    versions: fallback.clone(),
                    fetched_at: self.clock.now(),
                })
            }
            None => Err(not_found(
                SoftwareType::Bedrock,
                "latest",
                "no download page listed a server build and no fallback is configured",
            )),
        }
    }

    /// Forget the cached Bedrock feed.
    pub fn invalidate_bedrock_cache(&self) {
        self.bedrock_cache.clear();
    }

    async fn latest_release(&self) -> ProvisionResult<String> {
        let manifest: VersionManifest = self
            .downloader
            .get_json(&self.config.mojang_manifest_url)
            .await?;
        Ok(manifest.latest.release)
    }

    async fn vanilla(&self, version: &str) -> ProvisionResult<ResolvedArtifact> {
        let manifest: VersionManifest = self
            .downloader
            .get_json(&self.config.mojang_manifest_url)
            .await?;
        let id = if is_latest(version) {
            manifest.latest.release.clone()
        } else {
            version.to_string()
        };

        let entry = manifest
            .versions
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| {
                not_found(SoftwareType::Vanilla, version, "not in the Mojang version manifest")
            })?;
        let details: VersionDetails = self.downloader.get_json(&entry.url).await?;
        let server = details.downloads.server.ok_or_else(|| {
            not_found(
                SoftwareType::Vanilla,
                version,
                "this version has no dedicated server download",
            )
        })?;

        Ok(ResolvedArtifact {
            url: server.url,
            version: id,
            build: None,
            file_name: "server.jar".to_string(),
            sha1: Some(server.sha1),
        })
    }

    async fn paper(&self, version: &str, build: Option<&str>) -> ProvisionResult<ResolvedArtifact> {
        let base = &self.config.paper_api_url;
        let project: PaperProject = self.downloader.get_json(base).await?;
        let version = pick_version(SoftwareType::Paper, version, &project.versions)?;

        let details: PaperVersion = self
            .downloader
            .get_json(&join_url(base, &format!("versions/{}", version)))
            .await?;
        let build = match build {
            Some(requested) => {
                let number: u32 = requested
                    .parse()
                    .map_err(|_| ProvisionError::InvalidBuildIdentifier(requested.to_string()))?;
                if !details.builds.contains(&number) {
                    return Err(not_found(
                        SoftwareType::Paper,
                        &format!("{} build {}", version, requested),
                        "build is not listed upstream",
                    ));
                }
                number
            }
            None => *details
                .builds
                .last()
                .ok_or_else(|| not_found(SoftwareType::Paper, &version, "no builds published"))?,
        };

        Ok(ResolvedArtifact {
            url: join_url(
                base,
                &format!(
                    "versions/{v}/builds/{b}/downloads/paper-{v}-{b}.jar",
                    v = version,
                    b = build
                ),
            ),
            version,
            build: Some(build.to_string()),
            file_name: "server.jar".to_string(),
            sha1: None,
        })
    }

    async fn purpur(&self, version: &str, build: Option<&str>) -> ProvisionResult<ResolvedArtifact> {
        let base = &self.config.purpur_api_url;
        let project: PurpurProject = self.downloader.get_json(base).await?;
        let version = pick_version(SoftwareType::Purpur, version, &project.versions)?;

        let details: PurpurVersion = self.downloader.get_json(&join_url(base, &version)).await?;
        let build = match build {
            Some(requested) if details.builds.all.iter().any(|b| b == requested) => {
                requested.to_string()
            }
            Some(requested) => {
                return Err(not_found(
                    SoftwareType::Purpur,
                    &format!("{} build {}", version, requested),
                    "build is not listed upstream",
                ))
            }
            None => details.builds.latest.clone(),
        };

        Ok(ResolvedArtifact {
            url: join_url(base, &format!("{}/{}/download", version, build)),
            version,
            build: Some(build),
            file_name: "server.jar".to_string(),
            sha1: None,
        })
    }

    async fn spigot(&self, version: &str) -> ProvisionResult<ResolvedArtifact> {
        let version = if is_latest(version) {
            self.latest_release().await?
        } else {
            version.to_string()
        };
        Ok(ResolvedArtifact {
            url: fill_template(
                &self.config.spigot_download_template,
                &[("version", &version)],
            ),
            version,
            build: None,
            file_name: "server.jar".to_string(),
            sha1: None,
        })
    }

    async fn fabric(&self, version: &str, build: Option<&str>) -> ProvisionResult<ResolvedArtifact> {
        let base = &self.config.fabric_meta_url;
        let mc = if is_latest(version) {
            let games: Vec<GameVersion> = self
                .downloader
                .get_json(&join_url(base, "versions/game"))
                .await?;
            games
                .into_iter()
                .find(|g| g.stable)
                .map(|g| g.version)
                .ok_or_else(|| not_found(SoftwareType::Fabric, version, "no stable game version"))?
        } else {
            version.to_string()
        };

        let loaders: Vec<LoaderForGame> = self
            .downloader
            .get_json(&join_url(base, &format!("versions/loader/{}", mc)))
            .await?;
        if loaders.is_empty() {
            return Err(not_found(
                SoftwareType::Fabric,
                &mc,
                "Fabric does not support this Minecraft version",
            ));
        }
        let loader = match build {
            Some(requested) => loaders
                .iter()
                .find(|l| l.loader.version == requested)
                .map(|l| l.loader.version.clone())
                .ok_or_else(|| {
                    not_found(
                        SoftwareType::Fabric,
                        &format!("{} loader {}", mc, requested),
                        "loader is not listed upstream",
                    )
                })?,
            None => first_stable(loaders.iter().map(|l| (&l.loader.version, l.loader.stable)))
                .ok_or_else(|| not_found(SoftwareType::Fabric, &mc, "no loader builds"))?,
        };

        let installers: Vec<InstallerVersion> = self
            .downloader
            .get_json(&join_url(base, "versions/installer"))
            .await?;
        let installer = first_stable(installers.iter().map(|i| (&i.version, i.stable)))
            .ok_or_else(|| not_found(SoftwareType::Fabric, &mc, "no installer builds"))?;

        Ok(ResolvedArtifact {
            url: join_url(
                base,
                &format!("versions/loader/{}/{}/{}/server/jar", mc, loader, installer),
            ),
            version: mc,
            build: Some(loader),
            file_name: "server.jar".to_string(),
            sha1: None,
        })
    }

    async fn forge(&self, version: &str, build: Option<&str>) -> ProvisionResult<ResolvedArtifact> {
        let promotions: PromotionsSlim = self
            .downloader
            .get_json(&self.config.forge_promotions_url)
            .await?;

        let mc = if is_latest(version) {
            newest_promoted(&promotions)
                .ok_or_else(|| not_found(SoftwareType::Forge, version, "no promoted versions"))?
        } else {
            version.to_string()
        };

        let build = match build {
            Some(requested) => requested.to_string(),
            None => promotions
                .promos
                .get(&format!("{}-recommended", mc))
                .or_else(|| promotions.promos.get(&format!("{}-latest", mc)))
                .cloned()
                .ok_or_else(|| {
                    not_found(
                        SoftwareType::Forge,
                        &mc,
                        "no recommended or latest Forge build is promoted",
                    )
                })?,
        };

        let file_name = format!("forge-{}-{}-installer.jar", mc, build);
        Ok(ResolvedArtifact {
            url: join_url(
                &self.config.forge_maven_url,
                &format!("net/minecraftforge/forge/{}-{}/{}", mc, build, file_name),
            ),
            version: mc,
            build: Some(build),
            file_name,
            sha1: None,
        })
    }

    async fn neoforge(&self, version: &str, build: Option<&str>) -> ProvisionResult<ResolvedArtifact> {
        let metadata_url = join_url(
            &self.config.neoforge_maven_url,
            "net/neoforged/neoforge/maven-metadata.xml",
        );
        let xml = self.downloader.get_text(&metadata_url).await?;
        let metadata: MavenMetadata =
            serde_xml_rs::from_str(&xml).map_err(|e| ProvisionError::Upstream {
                url: metadata_url.clone(),
                message: format!("unreadable maven metadata: {}", e),
            })?;
        let versions = metadata.versioning.versions.version;

        let build = match build {
            Some(requested) if versions.iter().any(|v| v == requested) => requested.to_string(),
            Some(requested) => {
                return Err(not_found(
                    SoftwareType::NeoForge,
                    requested,
                    "build is not listed in the NeoForge maven metadata",
                ))
            }
            None if is_latest(version) => versions
                .last()
                .cloned()
                .ok_or_else(|| not_found(SoftwareType::NeoForge, version, "no builds published"))?,
            None => {
                let prefix = neoforge_prefix(version).ok_or_else(|| {
                    not_found(
                        SoftwareType::NeoForge,
                        version,
                        "not a 1.x Minecraft version NeoForge can target",
                    )
                })?;
                versions
                    .iter()
                    .filter(|v| v.starts_with(&prefix))
                    .last()
                    .cloned()
                    .ok_or_else(|| {
                        not_found(
                            SoftwareType::NeoForge,
                            version,
                            format!("no NeoForge builds start with {}", prefix),
                        )
                    })?
            }
        };

        let mc = if is_latest(version) {
            minecraft_for_neoforge(&build).unwrap_or_else(|| version.to_string())
        } else {
            version.to_string()
        };
        let file_name = format!("neoforge-{}-installer.jar", build);
        Ok(ResolvedArtifact {
            url: join_url(
                &self.config.neoforge_maven_url,
                &format!("net/neoforged/neoforge/{}/{}", build, file_name),
            ),
            version: mc,
            build: Some(build),
            file_name,
            sha1: None,
        })
    }

    async fn bedrock(&self, version: &str) -> ProvisionResult<ResolvedArtifact> {
        let version = if is_latest(version) {
            self.bedrock_versions().await?.latest
        } else {
            version.to_string()
        };
        Ok(ResolvedArtifact {
            url: fill_template(
                &self.config.bedrock_download_template,
                &[("platform", bedrock::platform()), ("version", &version)],
            ),
            file_name: format!("bedrock-server-{}.zip", version),
            version,
            build: None,
            sha1: None,
        })
    }
}

/// `latest` is the last listed version; anything else must be listed.
fn pick_version(software: SoftwareType, requested: &str, listed: &[String]) -> ProvisionResult<String> {
    if is_latest(requested) {
        return listed
            .last()
            .cloned()
            .ok_or_else(|| not_found(software, requested, "no versions published"));
    }
    if listed.iter().any(|v| v == requested) {
        Ok(requested.to_string())
    } else {
        Err(not_found(software, requested, "version is not listed upstream"))
    }
}

/// First entry flagged stable, else the first entry. Fabric lists newest first.
fn first_stable<'a>(entries: impl Iterator<Item = (&'a String, Option<bool>)>) -> Option<String> {
    let mut first = None;
    for (version, stable) in entries {
        if first.is_none() {
            first = Some(version.clone());
        }
        if stable.unwrap_or(false) {
            return Some(version.clone());
        }
    }
    first
}

/// Newest Minecraft version with a Forge promotion.
fn newest_promoted(promotions: &PromotionsSlim) -> Option<String> {
    promotions
        .promos
        .keys()
        .filter_map(|k| k.rsplit_once('-').map(|(mc, _)| mc))
        .max_by(|a, b| compare_versions(a, b))
        .map(|mc| mc.to_string())
}

/// NeoForge builds encode the Minecraft version: 1.20.4 -> `20.4.`, 1.21 -> `21.0.`
pub fn neoforge_prefix(mc_version: &str) -> Option<String> {
    let minor = minecraft_minor(mc_version)?;
    let patch = mc_version.split('.').nth(2).unwrap_or("0");
    Some(format!("{}.{}.", minor, patch))
}

/// Inverse of [`neoforge_prefix`]: `21.1.65` -> `1.21.1`, `21.0.3` -> `1.21`
pub fn minecraft_for_neoforge(build: &str) -> Option<String> {
    let mut parts = build.split('.');
    let minor = parts.next()?;
    let patch = parts.next()?;
    if patch == "0" {
        Some(format!("1.{}", minor))
    } else {
        Some(format!("1.{}.{}", minor, patch))
    }
}
