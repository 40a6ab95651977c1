//! Provisioner settings.
//! Every upstream endpoint, timeout and cache knob lives here so hosts can point the
//! engine at mirrors and tests can point it at a mock server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IoResultExt, ProvisionError, ProvisionResult};

// URL Constants
pub const MOJANG_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
pub const PAPER_API_URL: &str = "https://api.papermc.io/v2/projects/paper";
pub const PURPUR_API_URL: &str = "https://api.purpurmc.org/v2/purpur";
pub const SPIGOT_DOWNLOAD_TEMPLATE: &str = "https://download.getbukkit.org/spigot/spigot-{version}.jar";
pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2";
pub const FORGE_PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/";
pub const NEOFORGE_MAVEN_URL: &str = "https://maven.neoforged.net/releases/";
pub const MODRINTH_API_URL: &str = "https://api.modrinth.com/v2";
pub const BEDROCK_PAGE_TEMPLATE: &str = "https://www.minecraft.net/{locale}/download/server/bedrock";
pub const BEDROCK_DOWNLOAD_TEMPLATE: &str =
    "https://www.minecraft.net/bedrockdedicatedserver/bin-{platform}/bedrock-server-{version}.zip";

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://www.minecraft.net/";

pub const VERSION_CACHE_TTL_SECS: u64 = 60 * 60;
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
pub const RESPONSE_TIMEOUT_SECS: u64 = 30;
pub const EXTRACT_PROGRESS_INTERVAL: usize = 1000;
pub const RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub mojang_manifest_url: String,
    pub paper_api_url: String,
    pub purpur_api_url: String,
    /// `{version}` is substituted.
    pub spigot_download_template: String,
    pub fabric_meta_url: String,
    pub forge_promotions_url: String,
    pub forge_maven_url: String,
    pub neoforge_maven_url: String,
    pub modrinth_api_url: String,

    /// `{locale}` is substituted.
    pub bedrock_page_template: String,
    /// `{platform}` (`linux`/`win`) and `{version}` are substituted.
    pub bedrock_download_template: String,
    /// Tried in order until one page yields a server link.
    pub bedrock_locales: Vec<String>,
    /// Last-known-good versions, newest first.
    pub bedrock_fallback_versions: Vec<String>,

    pub user_agent: String,
    pub referer: String,
    pub connect_timeout_secs: u64,
    /// Time allowed between sending a request and receiving response headers.
    pub response_timeout_secs: u64,
    pub download_attempts: u32,
    /// Base delay between download attempts; attempt `n` waits `n` times this.
    pub retry_delay_ms: u64,
    pub version_cache_ttl_secs: u64,
    pub extract_progress_interval: usize,
    /// Wall-clock cap for the loader installer process. `None` waits forever.
    pub installer_timeout_secs: Option<u64>,
    /// Java version label (e.g. "17") -> java executable.
    pub java_paths: HashMap<String, PathBuf>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            mojang_manifest_url: MOJANG_MANIFEST_URL.to_string(),
            paper_api_url: PAPER_API_URL.to_string(),
            purpur_api_url: PURPUR_API_URL.to_string(),
            spigot_download_template: SPIGOT_DOWNLOAD_TEMPLATE.to_string(),
            fabric_meta_url: FABRIC_META_URL.to_string(),
            forge_promotions_url: FORGE_PROMOTIONS_URL.to_string(),
            forge_maven_url: FORGE_MAVEN_URL.to_string(),
            neoforge_maven_url: NEOFORGE_MAVEN_URL.to_string(),
            modrinth_api_url: MODRINTH_API_URL.to_string(),
            bedrock_page_template: BEDROCK_PAGE_TEMPLATE.to_string(),
            bedrock_download_template: BEDROCK_DOWNLOAD_TEMPLATE.to_string(),
            bedrock_locales: ["en-us", "en-gb", "de-de", "fr-fr", "es-es", "ja-jp"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            bedrock_fallback_versions: ["1.21.51.02", "1.21.50.10", "1.21.44.01"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            response_timeout_secs: RESPONSE_TIMEOUT_SECS,
            download_attempts: 3,
            retry_delay_ms: RETRY_DELAY_MS,
            version_cache_ttl_secs: VERSION_CACHE_TTL_SECS,
            extract_progress_interval: EXTRACT_PROGRESS_INTERVAL,
            installer_timeout_secs: Some(30 * 60),
            java_paths: HashMap::new(),
        }
    }
}

impl ProvisionerConfig {
    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let contents = std::fs::read_to_string(path).at_path(path)?;
        let config: ProvisionerConfig = serde_json::from_str(&contents).map_err(|e| {
            ProvisionError::InvalidRequest(format!("config {:?} is not valid: {}", path, e))
        })?;
        log::debug!("Loaded provisioner config from {:?}", path);
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn version_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.version_cache_ttl_secs)
    }

    pub fn installer_timeout(&self) -> Option<Duration> {
        self.installer_timeout_secs.map(Duration::from_secs)
    }
}

/// Substitute `{key}` placeholders in a URL template.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Join a base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
