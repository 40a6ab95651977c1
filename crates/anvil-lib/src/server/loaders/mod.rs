pub mod fabric;
pub mod forge;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ProvisionerConfig;
use crate::error::{IoResultExt, ProvisionResult};
use crate::server::core::archive::{self, ExpandOptions};
use crate::server::core::downloader::Downloader;
use crate::server::core::normalizer;
use crate::server::core::traits::{JavaProvider, ModloaderInstaller};
use crate::server::resolver::VersionResolver;
use crate::server::types::{InstallStage, ModLoader, ProgressReporter};

pub use fabric::FabricInstaller;
pub use forge::ForgeInstaller;

/// Entries that mark an extracted modpack as already flat.
pub const PACK_ROOT_MARKERS: &[&str] = &["mods", "config", "run.sh", "run.bat", "libraries"];

/// What a loader installer works on.
#[derive(Debug, Clone)]
pub struct LoaderInstall {
    pub server_dir: PathBuf,
    /// Minecraft version, or "latest"
    pub mc_version: String,
    /// Loader build; None picks the recommended one
    pub build: Option<String>,
    /// Modpack archive to lay down before the loader is installed
    pub local_archive: Option<PathBuf>,
}

impl LoaderInstall {
    pub fn new(server_dir: impl Into<PathBuf>, mc_version: impl Into<String>) -> Self {
        Self {
            server_dir: server_dir.into(),
            mc_version: mc_version.into(),
            build: None,
            local_archive: None,
        }
    }

    pub fn with_build(mut self, build: Option<String>) -> Self {
        self.build = build;
        self
    }

    pub fn with_local_archive(mut self, archive: Option<PathBuf>) -> Self {
        self.local_archive = archive;
        self
    }
}

/// Services shared by every loader installer.
#[derive(Clone)]
pub struct LoaderContext {
    pub config: Arc<ProvisionerConfig>,
    pub downloader: Arc<Downloader>,
    pub resolver: Arc<VersionResolver>,
    pub java: Arc<dyn JavaProvider>,
}

/// The installer responsible for `loader`.
pub fn installer_for(loader: ModLoader, ctx: LoaderContext) -> Box<dyn ModloaderInstaller> {
    match loader {
        ModLoader::Fabric => Box::new(FabricInstaller::new(ctx)),
        ModLoader::Forge => Box::new(ForgeInstaller::forge(ctx)),
        ModLoader::NeoForge => Box::new(ForgeInstaller::neoforge(ctx)),
    }
}

/// Expand `spec.local_archive` (if any) into the server dir and unwrap a lone
/// top-level folder.
pub(crate) async fn lay_down_archive(
    spec: &LoaderInstall,
    reporter: &Arc<dyn ProgressReporter>,
    interval: usize,
) -> ProvisionResult<()> {
    let Some(archive_path) = &spec.local_archive else {
        return Ok(());
    };
    reporter.set_stage(InstallStage::Extracting);

    let options = ExpandOptions::default()
        .with_interval(interval)
        .with_callback(archive::report_entries(reporter.clone()));
    archive::expand(archive_path, &spec.server_dir, options).await?;

    let root = spec.server_dir.clone();
    let archive_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tokio::task::spawn_blocking(move || {
        let sidecars = ["eula.txt", "server.properties", archive_name.as_str()];
        normalizer::flatten_single_nested(&root, PACK_ROOT_MARKERS, &sidecars).at_path(&root)
    })
    .await??;
    Ok(())
}

/// Accept the Minecraft EULA for the server in `dir`.
pub async fn write_eula(dir: &Path) -> ProvisionResult<()> {
    let path = dir.join("eula.txt");
    tokio::fs::write(&path, "eula=true\n").await.at_path(&path)
}
