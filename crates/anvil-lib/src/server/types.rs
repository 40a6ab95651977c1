use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Progress reporter trait for provisioning operations.
/// Implementations forward updates to whatever transport relays them to operators.
pub trait ProgressReporter: Send + Sync {
    /// Coarse status line ("Downloading Paper 1.21.1 build 130...")
    fn set_status(&self, message: &str);

    /// Pipeline stage transition
    fn set_stage(&self, stage: InstallStage) {
        self.set_status(stage.describe());
    }

    /// Fine-grained byte or entry counter. `percent` is None when `total` is unknown.
    fn update_progress(&self, current: u64, total: Option<u64>, percent: Option<u8>);

    /// One line of loader installer output
    fn installer_output(&self, _line: &str) {}

    /// Mark operation as complete
    fn done(&self, success: bool, message: Option<&str>);
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn set_status(&self, _message: &str) {}
    fn update_progress(&self, _current: u64, _total: Option<u64>, _percent: Option<u8>) {}
    fn done(&self, _success: bool, _message: Option<&str>) {}
}

/// Events emitted by [`ChannelProgressReporter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisionEvent {
    Status {
        message: String,
    },
    Stage {
        stage: InstallStage,
    },
    Progress {
        current: u64,
        total: Option<u64>,
        percent: Option<u8>,
    },
    InstallerOutput {
        line: String,
    },
    Done {
        success: bool,
        message: Option<String>,
    },
}

/// Reporter that turns every update into a [`ProvisionEvent`] on an unbounded channel.
/// Send errors are ignored: a dropped receiver must not fail the install.
pub struct ChannelProgressReporter {
    tx: mpsc::UnboundedSender<ProvisionEvent>,
}

impl ChannelProgressReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProvisionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ProvisionEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn set_status(&self, message: &str) {
        self.emit(ProvisionEvent::Status {
            message: message.to_string(),
        });
    }

    fn set_stage(&self, stage: InstallStage) {
        self.emit(ProvisionEvent::Stage { stage });
        self.set_status(stage.describe());
    }

    fn update_progress(&self, current: u64, total: Option<u64>, percent: Option<u8>) {
        self.emit(ProvisionEvent::Progress {
            current,
            total,
            percent,
        });
    }

    fn installer_output(&self, line: &str) {
        self.emit(ProvisionEvent::InstallerOutput {
            line: line.to_string(),
        });
    }

    fn done(&self, success: bool, message: Option<&str>) {
        self.emit(ProvisionEvent::Done {
            success,
            message: message.map(|m| m.to_string()),
        });
    }
}

/// Server software that can be provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareType {
    Vanilla,
    Paper,
    Purpur,
    Spigot,
    Fabric,
    Forge,
    NeoForge,
    Bedrock,
    #[serde(rename = "modpack")]
    ModpackZip,
}

impl SoftwareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoftwareType::Vanilla => "vanilla",
            SoftwareType::Paper => "paper",
            SoftwareType::Purpur => "purpur",
            SoftwareType::Spigot => "spigot",
            SoftwareType::Fabric => "fabric",
            SoftwareType::Forge => "forge",
            SoftwareType::NeoForge => "neoforge",
            SoftwareType::Bedrock => "bedrock",
            SoftwareType::ModpackZip => "modpack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "vanilla" => Some(SoftwareType::Vanilla),
            "paper" => Some(SoftwareType::Paper),
            "purpur" => Some(SoftwareType::Purpur),
            "spigot" => Some(SoftwareType::Spigot),
            "fabric" => Some(SoftwareType::Fabric),
            "forge" => Some(SoftwareType::Forge),
            "neoforge" => Some(SoftwareType::NeoForge),
            "bedrock" => Some(SoftwareType::Bedrock),
            "modpack" | "modpack_zip" => Some(SoftwareType::ModpackZip),
            _ => None,
        }
    }
}

impl fmt::Display for SoftwareType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages of one provisioning run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Resolving,
    Downloading,
    Extracting,
    Classifying,
    Normalizing,
    InstallingLoader,
    Finalizing,
    Complete,
    Failed,
}

impl InstallStage {
    pub fn describe(&self) -> &'static str {
        match self {
            InstallStage::Resolving => "Resolving version...",
            InstallStage::Downloading => "Downloading...",
            InstallStage::Extracting => "Extracting archive...",
            InstallStage::Classifying => "Inspecting modpack contents...",
            InstallStage::Normalizing => "Arranging server files...",
            InstallStage::InstallingLoader => "Installing mod loader...",
            InstallStage::Finalizing => "Finalizing...",
            InstallStage::Complete => "Installation complete",
            InstallStage::Failed => "Installation failed",
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            InstallStage::Resolving => "resolving",
            InstallStage::Downloading => "downloading",
            InstallStage::Extracting => "extracting",
            InstallStage::Classifying => "classifying",
            InstallStage::Normalizing => "normalizing",
            InstallStage::InstallingLoader => "installing loader",
            InstallStage::Finalizing => "finalizing",
            InstallStage::Complete => "complete",
            InstallStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Installation request
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub software: SoftwareType,

    /// Server root. Created if it does not exist.
    pub target_dir: PathBuf,

    /// Upstream version ("1.21.1", "1.21.11.01", or "latest")
    pub version: String,

    /// Build / loader version. None means latest (or recommended for Forge).
    pub build: Option<String>,

    /// Modpack archive: http(s) URL, local path or Modrinth project id/slug
    pub modpack_source: Option<String>,

    /// Minecraft version used when a client pack needs a loader installed
    pub mc_version: Option<String>,
}

impl InstallRequest {
    pub fn new(software: SoftwareType, target_dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            software,
            target_dir: target_dir.into(),
            version: version.into(),
            build: None,
            modpack_source: None,
            mc_version: None,
        }
    }

    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    pub fn with_modpack_source(mut self, source: impl Into<String>) -> Self {
        self.modpack_source = Some(source.into());
        self
    }

    pub fn with_mc_version(mut self, mc_version: impl Into<String>) -> Self {
        self.mc_version = Some(mc_version.into());
        self
    }

    /// The Minecraft version this request targets, when it can be told without
    /// asking upstream.
    pub fn minecraft_version(&self) -> Option<&str> {
        match self.software {
            SoftwareType::Bedrock => None,
            SoftwareType::ModpackZip => self.mc_version.as_deref(),
            _ if is_latest(&self.version) => self.mc_version.as_deref(),
            _ => Some(self.version.as_str()),
        }
    }
}

/// True for the "give me the newest" spellings callers use.
pub fn is_latest(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("latest")
        || value.eq_ignore_ascii_case("recommended")
}

/// How the provisioned server is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Entrypoint {
    /// `server.jar` in the server root
    ServerJar,
    /// A specific jar in the server root
    Jar(String),
    /// A launch script generated by a loader installer or shipped by a server pack
    Script(String),
    /// A native binary (Bedrock)
    Executable(String),
}

impl Entrypoint {
    pub fn file_name(&self) -> &str {
        match self {
            Entrypoint::ServerJar => "server.jar",
            Entrypoint::Jar(name) | Entrypoint::Script(name) | Entrypoint::Executable(name) => name,
        }
    }
}

impl fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Byte-level download progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub total_bytes: Option<u64>,
    pub current_bytes: u64,
    pub percent: Option<u8>,
}

impl DownloadProgress {
    pub fn new(current_bytes: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes
            .filter(|total| *total > 0)
            .map(|total| ((current_bytes.min(total) * 100) / total) as u8);
        Self {
            total_bytes,
            current_bytes,
            percent,
        }
    }
}

/// Mod loaders a client pack can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModLoader {
    Fabric,
    Forge,
    NeoForge,
}

impl ModLoader {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModLoader::Fabric => "fabric",
            ModLoader::Forge => "forge",
            ModLoader::NeoForge => "neoforge",
        }
    }

    pub fn software(&self) -> SoftwareType {
        match self {
            ModLoader::Fabric => SoftwareType::Fabric,
            ModLoader::Forge => SoftwareType::Forge,
            ModLoader::NeoForge => SoftwareType::NeoForge,
        }
    }

    /// Loader named by a pack manifest id such as `forge`, `neoforge` or `fabric-loader`.
    pub fn from_manifest_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "fabric" | "fabric-loader" => Some(ModLoader::Fabric),
            "forge" => Some(ModLoader::Forge),
            "neoforge" | "neoforged" => Some(ModLoader::NeoForge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackKind {
    ServerPack,
    ClientPack,
    Unknown,
}

/// Result of inspecting an extracted modpack tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModpackClassification {
    pub kind: PackKind,
    pub loader: Option<ModLoader>,
}

impl ModpackClassification {
    pub fn server_pack() -> Self {
        Self {
            kind: PackKind::ServerPack,
            loader: None,
        }
    }

    pub fn client_pack(loader: ModLoader) -> Self {
        Self {
            kind: PackKind::ClientPack,
            loader: Some(loader),
        }
    }

    pub fn unknown() -> Self {
        Self {
            kind: PackKind::Unknown,
            loader: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_omitted_without_total() {
        assert_eq!(DownloadProgress::new(10, None).percent, None);
        assert_eq!(DownloadProgress::new(10, Some(0)).percent, None);
        assert_eq!(DownloadProgress::new(50, Some(200)).percent, Some(25));
        assert_eq!(DownloadProgress::new(300, Some(200)).percent, Some(100));
    }

    #[test]
    fn software_type_round_trips_through_str() {
        for software in [
            SoftwareType::Vanilla,
            SoftwareType::Paper,
            SoftwareType::Purpur,
            SoftwareType::Spigot,
            SoftwareType::Fabric,
            SoftwareType::Forge,
            SoftwareType::NeoForge,
            SoftwareType::Bedrock,
            SoftwareType::ModpackZip,
        ] {
            assert_eq!(SoftwareType::parse(software.as_str()), Some(software));
        }
        assert_eq!(SoftwareType::parse("NEOFORGE"), Some(SoftwareType::NeoForge));
        assert_eq!(SoftwareType::parse("quilt"), None);
    }

    #[test]
    fn minecraft_version_of_request() {
        let paper = InstallRequest::new(SoftwareType::Paper, "/srv", "1.21.1");
        assert_eq!(paper.minecraft_version(), Some("1.21.1"));

        let latest = InstallRequest::new(SoftwareType::Forge, "/srv", "latest");
        assert_eq!(latest.minecraft_version(), None);

        let pack = InstallRequest::new(SoftwareType::ModpackZip, "/srv", "latest")
            .with_mc_version("1.20.1");
        assert_eq!(pack.minecraft_version(), Some("1.20.1"));
    }

    #[tokio::test]
    async fn channel_reporter_emits_stage_then_status() {
        let (reporter, mut rx) = ChannelProgressReporter::new();
        reporter.set_stage(InstallStage::Downloading);
        reporter.update_progress(5, Some(10), Some(50));
        drop(reporter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ProvisionEvent::Stage {
                    stage: InstallStage::Downloading
                },
                ProvisionEvent::Status {
                    message: "Downloading...".to_string()
                },
                ProvisionEvent::Progress {
                    current: 5,
                    total: Some(10),
                    percent: Some(50)
                },
            ]
        );
    }
}
