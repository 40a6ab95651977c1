use std::path::Path;

use super::types::{CurseForgeManifest, ModrinthIndex};
use crate::server::types::ModLoader;

/// What a pack's own manifest says about the server it wants.
#[derive(Debug, Clone, Default)]
pub struct PackHints {
    pub name: Option<String>,
    pub mc_version: Option<String>,
    pub loader: Option<ModLoader>,
    pub loader_version: Option<String>,
    /// Present for `.mrpack` archives; lists files to download
    pub modrinth_index: Option<ModrinthIndex>,
}

impl PackHints {
    /// Read `modrinth.index.json` or `manifest.json` from an extracted pack root.
    /// Missing or unreadable manifests yield empty hints.
    pub fn read(dir: &Path) -> Self {
        let modrinth = dir.join("modrinth.index.json");
        if modrinth.is_file() {
            match read_json::<ModrinthIndex>(&modrinth) {
                Some(index) => return Self::from_modrinth(index),
                None => log::warn!("Ignoring unreadable {:?}", modrinth),
            }
        }

        let curseforge = dir.join("manifest.json");
        if curseforge.is_file() {
            match read_json::<CurseForgeManifest>(&curseforge) {
                Some(manifest) => return Self::from_curseforge(manifest),
                None => log::warn!("Ignoring unreadable {:?}", curseforge),
            }
        }

        Self::default()
    }

    /// Like [`PackHints::read`], but also looks inside a lone top-level folder.
    pub fn read_nested(dir: &Path) -> Self {
        let hints = Self::read(dir);
        if hints.mc_version.is_some() || hints.modrinth_index.is_some() {
            return hints;
        }
        let subdirs: Vec<_> = std::fs::read_dir(dir)
            .map(|entries| entries.flatten().map(|e| e.path()).collect())
            .unwrap_or_default();
        match subdirs.as_slice() {
            [only] if only.is_dir() => Self::read(only),
            _ => hints,
        }
    }

    pub fn from_modrinth(index: ModrinthIndex) -> Self {
        let deps = &index.dependencies;
        let loader = [
            ("neoforge", ModLoader::NeoForge),
            ("forge", ModLoader::Forge),
            ("fabric-loader", ModLoader::Fabric),
        ]
        .into_iter()
        .find_map(|(key, loader)| deps.get(key).map(|v| (loader, v.clone())));

        log::info!(
            "Modrinth pack {} {} ({} files)",
            index.name,
            index.version_id,
            index.files.len()
        );
        Self {
            name: Some(index.name.clone()),
            mc_version: deps.get("minecraft").cloned(),
            loader: loader.as_ref().map(|(l, _)| *l),
            loader_version: loader.map(|(_, v)| v),
            modrinth_index: Some(index),
        }
    }

    pub fn from_curseforge(manifest: CurseForgeManifest) -> Self {
        let loaders = &manifest.minecraft.mod_loaders;
        let chosen = loaders
            .iter()
            .find(|l| l.primary)
            .or_else(|| loaders.first());
        let (loader, loader_version) = match chosen.and_then(|l| l.id.split_once('-')) {
            Some((id, version)) => (ModLoader::from_manifest_id(id), Some(version.to_string())),
            None => (None, None),
        };

        log::info!(
            "CurseForge pack {} {} for Minecraft {}",
            manifest.name,
            manifest.version,
            manifest.minecraft.version
        );
        Self {
            name: Some(manifest.name.clone()).filter(|n| !n.is_empty()),
            mc_version: Some(manifest.minecraft.version.clone()),
            loader,
            loader_version: loader.and(loader_version),
            modrinth_index: None,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Failed to parse {:?}: {}", path, e);
            None
        }
    }
}
