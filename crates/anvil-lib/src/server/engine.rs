//! Sequences resolver, downloader, expander, classifier, normalizer and loader
//! installers for each kind of server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ProvisionerConfig;
use crate::error::{InstallFailure, IoResultExt, ProvisionError, ProvisionResult};
use crate::server::core::archive::{self, report_entries, ExpandOptions};
use crate::server::core::classifier::{self, SERVER_SCRIPTS};
use crate::server::core::downloader::Downloader;
use crate::server::core::java::SystemJavaProvider;
use crate::server::core::normalizer;
use crate::server::core::traits::{BuildIdValidator, JavaProvider};
use crate::server::core::validator::PatternBuildIdValidator;
use crate::server::loaders::forge::detect_loader_entrypoint;
use crate::server::loaders::{
    installer_for, write_eula, LoaderContext, LoaderInstall, PACK_ROOT_MARKERS,
};
use crate::server::modpack::source::{self, ResolvedSource};
use crate::server::modpack::{mrpack, ModpackSource, PackHints, SourcedArchive};
use crate::server::resolver::{Clock, SystemClock, VersionCacheEntry, VersionResolver};
use crate::server::types::{
    ChannelProgressReporter, Entrypoint, InstallRequest, InstallStage, ModLoader,
    ModpackClassification, PackKind, ProgressReporter, ProvisionEvent, SoftwareType,
};

/// Scratch directory (inside the target) that modpacks are extracted into.
pub const SCRATCH_DIR: &str = "temp_extract";

/// Dropping a Bedrock server zip here skips the download.
pub const MANUAL_BEDROCK_ARCHIVE: &str = "bedrock-server-manual.zip";

/// Operator-edited Bedrock files an update must not clobber.
pub const BEDROCK_PRESERVED: &[&str] = &["server.properties", "allowlist.json", "permissions.json"];

const BEDROCK_BINARIES: &[&str] = &["bedrock_server", "bedrock_server.exe"];

#[cfg(windows)]
const BEDROCK_BINARY: &str = "bedrock_server.exe";
#[cfg(not(windows))]
const BEDROCK_BINARY: &str = "bedrock_server";


/// How a software type gets installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// One `server.jar`
    Jar,
    Bedrock,
    /// A Forge-family installer run
    Loader(ModLoader),
    Modpack,
}

impl Pipeline {
    pub fn for_software(software: SoftwareType) -> Self {
        match software {
            SoftwareType::Vanilla
            | SoftwareType::Paper
            | SoftwareType::Purpur
            | SoftwareType::Spigot
            | SoftwareType::Fabric => Pipeline::Jar,
            SoftwareType::Bedrock => Pipeline::Bedrock,
            SoftwareType::Forge => Pipeline::Loader(ModLoader::Forge),
            SoftwareType::NeoForge => Pipeline::Loader(ModLoader::NeoForge),
            SoftwareType::ModpackZip => Pipeline::Modpack,
        }
    }
}

/// Forwards every update and remembers the current stage, so a failure can say
/// where it happened.
struct StageTracker {
    inner: Arc<dyn ProgressReporter>,
    current: Mutex<InstallStage>,
}

impl StageTracker {
    fn new(inner: Arc<dyn ProgressReporter>) -> Self {
        Self {
            inner,
            current: Mutex::new(InstallStage::Resolving),
        }
    }

    fn current(&self) -> InstallStage {
        self.current
            .lock()
            .map(|stage| *stage)
            .unwrap_or(InstallStage::Failed)
    }
}

impl ProgressReporter for StageTracker {
    fn set_status(&self, message: &str) {
        self.inner.set_status(message);
    }

    fn set_stage(&self, stage: InstallStage) {
        log::debug!("Stage -> {}", stage);
        if let Ok(mut current) = self.current.lock() {
            *current = stage;
        }
        self.inner.set_stage(stage);
    }

    fn update_progress(&self, current: u64, total: Option<u64>, percent: Option<u8>) {
        self.inner.update_progress(current, total, percent);
    }

    fn installer_output(&self, line: &str) {
        self.inner.installer_output(line);
    }

    fn done(&self, success: bool, message: Option<&str>) {
        self.inner.done(success, message);
    }
}

/// Provisions server directories. Cheap to clone; clones share the HTTP client and
/// the version cache.
#[derive(Clone)]
pub struct ProvisioningEngine {
    config: Arc<ProvisionerConfig>,
    downloader: Arc<Downloader>,
    resolver: Arc<VersionResolver>,
    java: Arc<dyn JavaProvider>,
}

impl ProvisioningEngine {
    /// Engine using Java from the host and the default build-id rules.
    pub fn new(config: ProvisionerConfig) -> ProvisionResult<Self> {
        let java = Arc::new(SystemJavaProvider::new(config.java_paths.clone()));
        Self::with_collaborators(
            config,
            java,
            Arc::new(PatternBuildIdValidator),
            Arc::new(SystemClock),
        )
    }

    pub fn with_collaborators(
        config: ProvisionerConfig,
        java: Arc<dyn JavaProvider>,
        validator: Arc<dyn BuildIdValidator>,
        clock: Arc<dyn Clock>,
    ) -> ProvisionResult<Self> {
        let config = Arc::new(config);
        let downloader = Arc::new(Downloader::new(&config)?);
        let resolver = Arc::new(VersionResolver::new(
            config.clone(),
            downloader.clone(),
            validator,
            clock,
        ));
        Ok(Self {
            config,
            downloader,
            resolver,
            java,
        })
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Known Bedrock server versions, newest first.
    pub async fn bedrock_versions(&self) -> ProvisionResult<VersionCacheEntry> {
        self.resolver.bedrock_versions().await
    }

    /// Run `install` on the runtime and stream its events.
    pub fn spawn_install(
        &self,
        request: InstallRequest,
    ) -> (
        JoinHandle<Result<Entrypoint, InstallFailure>>,
        mpsc::UnboundedReceiver<ProvisionEvent>,
    ) {
        let (reporter, events) = ChannelProgressReporter::new();
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.install(request, Arc::new(reporter)).await });
        (handle, events)
    }

    /// Provision `request.target_dir` and report how to start the server.
    pub async fn install(
        &self,
        request: InstallRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Entrypoint, InstallFailure> {
        let tracker = Arc::new(StageTracker::new(reporter));
        let as_reporter: Arc<dyn ProgressReporter> = tracker.clone();
        log::info!(
            "Provisioning {} {} into {:?}",
            request.software,
            request.version,
            request.target_dir
        );

        match self.run_pipeline(&request, as_reporter).await {
            Ok(entrypoint) => {
                tracker.set_stage(InstallStage::Complete);
                let message = format!("Start the server with {}", entrypoint);
                tracker.done(true, Some(message.as_str()));
                log::info!(
                    "{} ready in {:?} (entrypoint {})",
                    request.software,
                    request.target_dir,
                    entrypoint
                );
                Ok(entrypoint)
            }
            Err(error) => {
                let stage = tracker.current();
                cleanup_after_failure(&request.target_dir).await;
                let failure = InstallFailure {
                    software: request.software,
                    target_dir: request.target_dir.clone(),
                    stage,
                    hint: failure_hint(&request, stage, &error),
                    error,
                };
                log::error!("{}", failure);
                tracker.set_stage(InstallStage::Failed);
                tracker.done(false, Some(failure.to_string().as_str()));
                Err(failure)
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &InstallRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        let target = request.target_dir.as_path();
        if !target.is_absolute() {
            return Err(ProvisionError::InvalidRequest(format!(
                "target directory {:?} must be absolute",
                target
            )));
        }
        tokio::fs::create_dir_all(target).await.at_path(target)?;

        match Pipeline::for_software(request.software) {
            Pipeline::Jar => self.install_jar(request, reporter).await,
            Pipeline::Bedrock => self.install_bedrock(request, reporter).await,
            Pipeline::Loader(loader) => self.install_loader(request, loader, reporter).await,
            Pipeline::Modpack => self.install_modpack(request, reporter).await,
        }
    }

    fn loader_context(&self) -> LoaderContext {
        LoaderContext {
            config: self.config.clone(),
            downloader: self.downloader.clone(),
            resolver: self.resolver.clone(),
            java: self.java.clone(),
        }
    }

    async fn install_jar(
        &self,
        request: &InstallRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        if request.modpack_source.is_some() {
            log::warn!(
                "{} installs ignore modpack_source; use the modpack type instead",
                request.software
            );
        }

        reporter.set_stage(InstallStage::Resolving);
        let artifact = self
            .resolver
            .resolve(request.software, &request.version, request.build.as_deref())
            .await?;

        reporter.set_stage(InstallStage::Downloading);
        reporter.set_status(&format!(
            "Downloading {} {}{}...",
            request.software,
            artifact.version,
            artifact
                .build
                .as_ref()
                .map(|b| format!(" build {}", b))
                .unwrap_or_default()
        ));
        self.downloader
            .download_verified(
                &artifact.url,
                &request.target_dir.join("server.jar"),
                artifact.sha1.as_deref(),
                reporter.as_ref(),
            )
            .await?;

        reporter.set_stage(InstallStage::Finalizing);
        write_eula(&request.target_dir).await?;
        Ok(Entrypoint::ServerJar)
    }

    async fn install_bedrock(
        &self,
        request: &InstallRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        let target = request.target_dir.as_path();
        reporter.set_stage(InstallStage::Resolving);

        let manual = target.join(MANUAL_BEDROCK_ARCHIVE);
        let archive = if manual.is_file() {
            log::info!("Using manually uploaded {:?}", manual);
            SourcedArchive {
                path: manual,
                owned: false,
            }
        } else {
            let artifact = self
                .resolver
                .resolve(SoftwareType::Bedrock, &request.version, None)
                .await?;
            reporter.set_stage(InstallStage::Downloading);
            reporter.set_status(&format!("Downloading Bedrock server {}...", artifact.version));
            let path = target.join(&artifact.file_name);
            self.downloader
                .download(&artifact.url, &path, reporter.as_ref())
                .await?;
            SourcedArchive { path, owned: true }
        };

        let result = self.lay_down_bedrock(target, &archive, &reporter).await;
        // the downloaded zip is transient whether or not the install worked
        if archive.owned {
            remove_file_quietly(&archive.path).await;
        }
        result
    }

    async fn lay_down_bedrock(
        &self,
        target: &Path,
        archive: &SourcedArchive,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        reporter.set_stage(InstallStage::Extracting);
        let existing = root_entries(target).await;
        let options = ExpandOptions::default()
            .with_interval(self.config.extract_progress_interval)
            .with_callback(report_entries(reporter.clone()))
            .preserving(BEDROCK_PRESERVED.iter().copied());
        archive::expand(&archive.path, target, options).await?;

        reporter.set_stage(InstallStage::Normalizing);
        let root = target.to_path_buf();
        let archive_name = file_name_of(&archive.path);
        tokio::task::spawn_blocking(move || flatten_bedrock(&root, &existing, &archive_name)).await??;

        reporter.set_stage(InstallStage::Finalizing);
        let binary = target.join(BEDROCK_BINARY);
        if !binary.is_file() {
            return Err(ProvisionError::extraction(
                &archive.path,
                format!("archive does not contain {}", BEDROCK_BINARY),
            ));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))
                .await
                .at_path(&binary)?;
        }
        write_eula(target).await?;
        Ok(Entrypoint::Executable(BEDROCK_BINARY.to_string()))
    }

    async fn install_loader(
        &self,
        request: &InstallRequest,
        loader: ModLoader,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        reporter.set_stage(InstallStage::Resolving);
        let archive = match &request.modpack_source {
            Some(raw) => {
                let source = ModpackSource::parse(raw)?;
                let resolved = source::resolve(
                    &source,
                    &self.downloader,
                    &self.config,
                    request.minecraft_version(),
                )
                .await?;
                Some(self.fetch_archive(resolved, &request.target_dir, &reporter).await?)
            }
            None => None,
        };

        let spec = LoaderInstall::new(&request.target_dir, request.version.clone())
            .with_build(request.build.clone())
            .with_local_archive(archive.as_ref().map(|a| a.path.clone()));
        let installed = installer_for(loader, self.loader_context())
            .install(&spec, reporter.clone())
            .await;
        if let Some(archive) = archive.filter(|a| a.owned) {
            remove_file_quietly(&archive.path).await;
        }
        let entrypoint = installed?;

        reporter.set_stage(InstallStage::Finalizing);
        write_eula(&request.target_dir).await?;
        Ok(entrypoint)
    }

    async fn install_modpack(
        &self,
        request: &InstallRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        let target = request.target_dir.as_path();
        reporter.set_stage(InstallStage::Resolving);
        let raw = request.modpack_source.as_deref().ok_or_else(|| {
            ProvisionError::InvalidRequest("modpack installs need a modpack_source".to_string())
        })?;
        let source = ModpackSource::parse(raw)?;
        let resolved = source::resolve(
            &source,
            &self.downloader,
            &self.config,
            request.mc_version.as_deref(),
        )
        .await?;
        let archive = self.fetch_archive(resolved, target, &reporter).await?;

        let result = self.unpack_modpack(request, &archive, &reporter).await;
        if archive.owned {
            remove_file_quietly(&archive.path).await;
        }
        result
    }

    async fn unpack_modpack(
        &self,
        request: &InstallRequest,
        archive: &SourcedArchive,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<Entrypoint> {
        let target = request.target_dir.as_path();
        reporter.set_stage(InstallStage::Extracting);
        let scratch = target.join(SCRATCH_DIR);
        if scratch.exists() {
            tokio::fs::remove_dir_all(&scratch).await.at_path(&scratch)?;
        }
        let options = ExpandOptions::default()
            .with_interval(self.config.extract_progress_interval)
            .with_callback(report_entries(reporter.clone()));
        archive::expand(&archive.path, &scratch, options).await?;

        reporter.set_stage(InstallStage::Classifying);
        let scratch_for_scan = scratch.clone();
        let (hints, first_look) = tokio::task::spawn_blocking(move || {
            (
                PackHints::read_nested(&scratch_for_scan),
                classifier::classify(&scratch_for_scan),
            )
        })
        .await?;
        log::info!(
            "Modpack classified as {:?} (loader {:?})",
            first_look.kind,
            first_look.loader
        );

        reporter.set_stage(InstallStage::Normalizing);
        let (src, dest) = (scratch.clone(), target.to_path_buf());
        let archive_name = file_name_of(&archive.path);
        tokio::task::spawn_blocking(move || -> ProvisionResult<()> {
            let mut markers: Vec<&str> = SERVER_SCRIPTS.to_vec();
            markers.extend_from_slice(PACK_ROOT_MARKERS);
            markers.push("server.jar");

            let mut pack_markers = markers.clone();
            pack_markers.extend_from_slice(normalizer::OVERRIDE_DIRS);
            pack_markers.extend_from_slice(&["manifest.json", "modrinth.index.json"]);
            normalizer::flatten_single_nested(&src, &pack_markers, &[]).at_path(&src)?;

            if !normalizer::apply_overrides(&src, &dest).at_path(&src)? {
                normalizer::merge_tree(&src, &dest).at_path(&src)?;
            }
            let sidecars = ["eula.txt", "server.properties", SCRATCH_DIR, archive_name.as_str()];
            normalizer::flatten_single_nested(&dest, &markers, &sidecars).at_path(&dest)?;
            Ok(())
        })
        .await??;

        if let Some(index) = &hints.modrinth_index {
            mrpack::download_server_files(index, target, &self.downloader, reporter.as_ref()).await?;
        }

        let classification = self.settle_classification(first_look, &hints, target).await?;
        let entrypoint = match classification.kind {
            PackKind::ClientPack => {
                let loader = classification.loader.unwrap_or(ModLoader::Forge);
                let mc = request
                    .mc_version
                    .clone()
                    .or_else(|| hints.mc_version.clone())
                    .ok_or_else(|| {
                        ProvisionError::InvalidRequest(format!(
                            "this is a {} client pack; set mc_version so the loader can be installed",
                            loader.as_str()
                        ))
                    })?;
                let build = request.build.clone().or_else(|| {
                    hints
                        .loader_version
                        .clone()
                        .filter(|_| hints.loader == Some(loader))
                });
                log::info!(
                    "Installing {} {} for Minecraft {} under the client pack",
                    loader.as_str(),
                    build.as_deref().unwrap_or("latest"),
                    mc
                );
                let spec = LoaderInstall::new(target, mc).with_build(build);
                installer_for(loader, self.loader_context())
                    .install(&spec, reporter.clone())
                    .await?
            }
            PackKind::ServerPack => classifier::detect_entrypoint(target)
                .unwrap_or_else(|| detect_loader_entrypoint(target)),
            PackKind::Unknown => classifier::detect_entrypoint(target).ok_or_else(|| {
                ProvisionError::InvalidRequest(
                    "the archive is neither a server pack nor a client pack with mods".to_string(),
                )
            })?,
        };

        reporter.set_stage(InstallStage::Finalizing);
        if scratch.exists() {
            tokio::fs::remove_dir_all(&scratch).await.at_path(&scratch)?;
        }
        write_eula(target).await?;
        Ok(entrypoint)
    }

    /// A pack that looked empty in scratch may have gained mods from its index;
    /// failing that, its manifest's loader decides.
    async fn settle_classification(
        &self,
        first_look: ModpackClassification,
        hints: &PackHints,
        target: &Path,
    ) -> ProvisionResult<ModpackClassification> {
        if first_look.kind != PackKind::Unknown {
            return Ok(first_look);
        }
        let root = target.to_path_buf();
        let second_look = tokio::task::spawn_blocking(move || classifier::classify(&root)).await?;
        if second_look.kind != PackKind::Unknown {
            return Ok(second_look);
        }
        Ok(hints
            .loader
            .map(ModpackClassification::client_pack)
            .unwrap_or(second_look))
    }

    async fn fetch_archive(
        &self,
        resolved: ResolvedSource,
        target: &Path,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> ProvisionResult<SourcedArchive> {
        match resolved {
            ResolvedSource::Local(path) => {
                log::info!("Using local modpack archive {:?}", path);
                Ok(SourcedArchive { path, owned: false })
            }
            ResolvedSource::Remote { url, file_name } => {
                reporter.set_stage(InstallStage::Downloading);
                reporter.set_status(&format!("Downloading {}...", file_name));
                let path = target.join(&file_name);
                self.downloader.download(&url, &path, reporter.as_ref()).await?;
                Ok(SourcedArchive { path, owned: true })
            }
        }
    }
}

/// Hoist a wrapped Bedrock build into `root`.
///
/// Entries that existed before extraction count as sidecars, unless they are a
/// directory now holding a server binary (a wrapper left by an earlier run). When
/// that finds nothing and the binary is still missing, the plain single-folder rule
/// applies.
fn flatten_bedrock(root: &Path, existing: &[String], archive_name: &str) -> ProvisionResult<bool> {
    let holds_binary = |dir: &Path| BEDROCK_BINARIES.iter().any(|b| dir.join(b).is_file());

    let mut sidecars: Vec<&str> = existing
        .iter()
        .map(String::as_str)
        .filter(|name| !holds_binary(root.join(name).as_path()))
        .collect();
    sidecars.extend_from_slice(&["eula.txt", MANUAL_BEDROCK_ARCHIVE, archive_name]);

    let mut wrapper = normalizer::find_wrapper(root, &[], &sidecars).at_path(root)?;
    if wrapper.is_none() && !BEDROCK_BINARIES.iter().any(|b| root.join(b).is_file()) {
        sidecars = vec!["eula.txt", MANUAL_BEDROCK_ARCHIVE, archive_name];
        sidecars.extend_from_slice(BEDROCK_PRESERVED);
        wrapper = normalizer::find_wrapper(root, BEDROCK_BINARIES, &sidecars).at_path(root)?;
    }
    let Some(wrapper) = wrapper.filter(|w| holds_binary(w.as_path())) else {
        return Ok(false);
    };

    // the operator's copies at the root win over the archive defaults
    for name in BEDROCK_PRESERVED {
        let packaged = wrapper.join(name);
        if root.join(name).is_file() && packaged.is_file() {
            std::fs::remove_file(&packaged).at_path(&packaged)?;
        }
    }
    normalizer::flatten_single_nested(root, &[], &sidecars).at_path(root)
}

/// Names directly under `dir`; empty when it cannot be read.
async fn root_entries(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove {:?}: {}", path, e);
    }
}

/// Drop the scratch directory and any half-written downloads. Everything else in
/// the target stays where it is.
async fn cleanup_after_failure(target: &Path) {
    let scratch = target.join(SCRATCH_DIR);
    if scratch.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            log::warn!("Failed to remove scratch dir {:?}: {}", scratch, e);
        }
    }

    let Ok(mut entries) = tokio::fs::read_dir(target).await else {
        return;
    };
    let mut partials: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "part") {
            partials.push(path);
        }
    }
    for partial in partials {
        log::debug!("Removing partial download {:?}", partial);
        remove_file_quietly(&partial).await;
    }
}

fn failure_hint(request: &InstallRequest, stage: InstallStage, error: &ProvisionError) -> Option<String> {
    match error {
        ProvisionError::JavaUnavailable { label, .. } => Some(format!(
            "install Java {} or point java_paths[\"{}\"] at its java executable",
            label, label
        )),
        ProvisionError::InstallerProcessFailed { .. } => {
            Some("the installer output was streamed to the progress log".to_string())
        }
        _ if request.software == SoftwareType::Bedrock
            && matches!(stage, InstallStage::Resolving | InstallStage::Downloading)
            && (error.is_network() || matches!(error, ProvisionError::UpstreamVersionNotFound { .. })) =>
        {
            Some(format!(
                "download the Bedrock server zip yourself and place it at {:?}, then retry",
                request.target_dir.join(MANUAL_BEDROCK_ARCHIVE)
            ))
        }
        _ => None,
    }
}
