use std::fs::File;
use std::path::{Path, PathBuf};

use crate::server::types::{Entrypoint, ModLoader, ModpackClassification};

/// Launch scripts whose presence means the pack already is a server.
pub const SERVER_SCRIPTS: &[&str] = &["run.bat", "run.sh", "start.bat", "start.sh"];

/// Decide whether an extracted modpack tree is a ready server or a client pack
/// that still needs a loader.
///
/// Rules, first match wins:
/// 1. a launch script, or a root jar with "server" in its name
/// 2. a `libraries/` directory
/// 3. no `mods/` (nor `overrides/mods/`) means there is nothing to judge
/// 4. the first mod jar whose metadata names a loader
/// 5. mods nobody recognised are assumed to be Forge
pub fn classify(dir: &Path) -> ModpackClassification {
    if SERVER_SCRIPTS.iter().any(|s| dir.join(s).is_file()) || has_server_jar(dir) {
        log::debug!("{:?} has a launch script or server jar", dir);
        return ModpackClassification::server_pack();
    }

    if dir.join("libraries").is_dir() {
        log::debug!("{:?} ships libraries/", dir);
        return ModpackClassification::server_pack();
    }

    let mods_dir = [dir.join("mods"), dir.join("overrides").join("mods")]
        .into_iter()
        .find(|p| p.is_dir());
    let Some(mods_dir) = mods_dir else {
        return ModpackClassification::unknown();
    };

    for jar in mod_jars(&mods_dir) {
        if let Some(loader) = inspect_jar(&jar) {
            log::info!("{:?} identifies the pack as a {} client pack", jar, loader.as_str());
            return ModpackClassification::client_pack(loader);
        }
    }

    log::info!("No mod in {:?} names a loader, assuming Forge", mods_dir);
    ModpackClassification::client_pack(ModLoader::Forge)
}

fn has_server_jar(dir: &Path) -> bool {
    root_files(dir).iter().any(|name| {
        let lower = name.to_ascii_lowercase();
        lower.ends_with(".jar") && lower.contains("server")
    })
}

fn root_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
        .collect()
}

fn mod_jars(mods_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(mods_dir) else {
        return Vec::new();
    };
    let mut jars: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("jar"))
                    .unwrap_or(false)
        })
        .collect();
    jars.sort();
    jars
}

/// Loader named by a mod jar's metadata. Corrupt jars yield `None`.
///
/// When a jar carries several descriptors the order is Fabric, then Forge, then NeoForge.
pub fn inspect_jar(jar: &Path) -> Option<ModLoader> {
    let file = File::open(jar).ok()?;
    let archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(e) => {
            log::warn!("Skipping unreadable mod jar {:?}: {}", jar, e);
            return None;
        }
    };

    let has = |name: &str| archive.index_for_name(name).is_some();
    if has("fabric.mod.json") {
        Some(ModLoader::Fabric)
    } else if has("META-INF/mods.toml") || has("mcmod.info") {
        Some(ModLoader::Forge)
    } else if has("META-INF/neoforge.mods.toml") {
        Some(ModLoader::NeoForge)
    } else {
        None
    }
}

/// How to start a server directory that arrived ready-made.
///
/// Prefers the platform's run script, then any launch script, then `server.jar`,
/// then a single jar with "server" in its name.
pub fn detect_entrypoint(dir: &Path) -> Option<Entrypoint> {
    let scripts: [&str; 4] = if cfg!(windows) {
        ["run.bat", "start.bat", "run.sh", "start.sh"]
    } else {
        ["run.sh", "start.sh", "run.bat", "start.bat"]
    };
    if let Some(script) = scripts.iter().find(|s| dir.join(s).is_file()) {
        return Some(Entrypoint::Script(script.to_string()));
    }

    if dir.join("server.jar").is_file() {
        return Some(Entrypoint::ServerJar);
    }

    let mut jars: Vec<String> = root_files(dir)
        .into_iter()
        .filter(|n| {
            let lower = n.to_ascii_lowercase();
            lower.ends_with(".jar") && lower.contains("server") && !lower.contains("installer")
        })
        .collect();
    jars.sort();
    match jars.len() {
        1 => jars.pop().map(Entrypoint::Jar),
        _ => None,
    }
}
