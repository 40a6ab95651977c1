use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;

use super::{lay_down_archive, write_eula, LoaderContext, LoaderInstall};
use crate::error::{IoResultExt, ProvisionError, ProvisionResult};
use crate::server::core::traits::ModloaderInstaller;
use crate::server::types::{Entrypoint, InstallStage, ModLoader, ProgressReporter};
use crate::utils::hardware::{default_jvm_args, get_total_memory_mb};
use crate::utils::process::ScopedProcess;
use crate::utils::version::required_java_major;

/// Runs the Forge or NeoForge installer jar in server mode.
pub struct ForgeInstaller {
    ctx: LoaderContext,
    loader: ModLoader,
}

impl ForgeInstaller {
    pub fn forge(ctx: LoaderContext) -> Self {
        Self {
            ctx,
            loader: ModLoader::Forge,
        }
    }

    pub fn neoforge(ctx: LoaderContext) -> Self {
        Self {
            ctx,
            loader: ModLoader::NeoForge,
        }
    }
}

impl ModloaderInstaller for ForgeInstaller {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderInstall,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, ProvisionResult<Entrypoint>> {
        Box::pin(install_forge_server(&self.ctx, self.loader, spec, reporter))
    }
}

/// Install a Forge-family server into `spec.server_dir`.
pub async fn install_forge_server(
    ctx: &LoaderContext,
    loader: ModLoader,
    spec: &LoaderInstall,
    reporter: Arc<dyn ProgressReporter>,
) -> ProvisionResult<Entrypoint> {
    let software = loader.software();
    let server_dir = spec.server_dir.as_path();
    log::info!(
        "Installing {} server for Minecraft {} into {:?}",
        software,
        spec.mc_version,
        server_dir
    );
    tokio::fs::create_dir_all(server_dir).await.at_path(server_dir)?;

    lay_down_archive(spec, &reporter, ctx.config.extract_progress_interval).await?;

    reporter.set_stage(InstallStage::InstallingLoader);
    let artifact = ctx
        .resolver
        .resolve(software, &spec.mc_version, spec.build.as_deref())
        .await?;
    let build = artifact.build.clone().unwrap_or_default();

    let java_label = required_java_major(&artifact.version).to_string();
    let java = ctx.java.ensure_java(&java_label).await?;
    log::info!("Using Java {} at {:?}", java_label, java);

    reporter.set_status(&format!("Downloading {} {} installer...", software, build));
    let installer = server_dir.join(&artifact.file_name);
    ctx.downloader
        .download(&artifact.url, &installer, reporter.as_ref())
        .await?;

    reporter.set_status(&format!("Running {} {} installer...", software, build));
    let mut command = Command::new(&java);
    command
        .arg("-jar")
        .arg(&artifact.file_name)
        .arg("--installServer");

    let process = ScopedProcess::spawn(command, server_dir, reporter.clone()).map_err(|e| {
        ProvisionError::JavaUnavailable {
            label: java_label.clone(),
            message: format!("failed to start {:?}: {}", java, e),
        }
    })?;
    log::debug!("Installer running as pid {:?}", process.id());
    let exit = process
        .wait(ctx.config.installer_timeout())
        .await
        .at_path(server_dir)?;

    remove_quietly(&installer).await;
    if !exit.success() {
        log::error!(
            "{} installer failed ({:?}); last stderr lines:\n{}",
            software,
            exit.code(),
            exit.stderr_tail.join("\n")
        );
        return Err(ProvisionError::InstallerProcessFailed {
            exit_code: exit.code(),
            stderr_tail: exit.stderr_tail.join("\n"),
        });
    }

    remove_quietly(&server_dir.join("installer.log")).await;
    remove_quietly(&server_dir.join(format!("{}.log", artifact.file_name))).await;
    write_eula(server_dir).await?;

    if loader == ModLoader::NeoForge {
        ensure_jvm_args(server_dir).await?;
    }

    let entrypoint = detect_loader_entrypoint(server_dir);
    log::info!("{} {} installed, start with {}", software, build, entrypoint);
    Ok(entrypoint)
}

/// Seed `user_jvm_args.txt` with heap settings sized for this host.
async fn ensure_jvm_args(server_dir: &Path) -> ProvisionResult<()> {
    let path = server_dir.join("user_jvm_args.txt");
    if path.exists() {
        return Ok(());
    }
    let args = default_jvm_args(get_total_memory_mb());
    log::debug!("Writing {:?}: {}", path, args.replace('\n', " "));
    tokio::fs::write(&path, args).await.at_path(&path)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Modern installers write `run.sh`/`run.bat`; legacy ones leave a `forge-*.jar`.
pub fn detect_loader_entrypoint(dir: &Path) -> Entrypoint {
    let scripts: [&str; 2] = if cfg!(windows) {
        ["run.bat", "run.sh"]
    } else {
        ["run.sh", "run.bat"]
    };
    if let Some(script) = scripts.iter().find(|s| dir.join(s).is_file()) {
        return Entrypoint::Script(script.to_string());
    }

    let mut jars: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
                .filter(|n| n.starts_with("forge-") && n.ends_with(".jar") && !n.contains("installer"))
                .collect()
        })
        .unwrap_or_default();
    if jars.len() == 1 {
        if let Some(jar) = jars.pop() {
            return Entrypoint::Jar(jar);
        }
    }

    log::warn!("No launch script or forge jar found in {:?}, assuming run.bat", dir);
    Entrypoint::Script("run.bat".to_string())
}
