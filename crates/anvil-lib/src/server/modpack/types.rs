use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Modrinth modpack index (modrinth.index.json)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModrinthIndex {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub version_id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<ModrinthFile>,
    /// `minecraft`, `forge`, `neoforge`, `fabric-loader`, ... -> version
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
}

fn default_format_version() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModrinthFile {
    pub path: String,
    #[serde(default)]
    pub hashes: HashMap<String, String>,
    pub env: Option<ModrinthEnv>,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub file_size: u64,
}

impl ModrinthFile {
    /// Files marked `unsupported` on the server side are client-only.
    pub fn wanted_on_server(&self) -> bool {
        self.env
            .as_ref()
            .map_or(true, |env| env.server != "unsupported")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct ModrinthEnv {
    #[serde(default = "default_required")]
    pub client: String, // "required", "optional", "unsupported"
    #[serde(default = "default_required")]
    pub server: String,
}

fn default_required() -> String {
    "required".to_string()
}

/// CurseForge modpack manifest (manifest.json)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeManifest {
    pub minecraft: CurseForgeMinecraft,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_overrides")]
    pub overrides: String,
}

fn default_overrides() -> String {
    "overrides".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeMinecraft {
    pub version: String,
    #[serde(default)]
    pub mod_loaders: Vec<CurseForgeModLoader>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeModLoader {
    /// e.g. `forge-47.2.0`, `neoforge-20.4.80`, `fabric-0.15.7`
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}
