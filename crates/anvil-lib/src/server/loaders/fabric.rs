use futures::future::BoxFuture;
use std::sync::Arc;

use super::{lay_down_archive, write_eula, LoaderContext, LoaderInstall};
use crate::error::{IoResultExt, ProvisionResult};
use crate::server::core::traits::ModloaderInstaller;
use crate::server::types::{Entrypoint, InstallStage, ProgressReporter, SoftwareType};

/// Fabric needs no installer run: the meta service hands out a launcher jar that
/// fetches the loader libraries on first start.
pub struct FabricInstaller {
    ctx: LoaderContext,
}

impl FabricInstaller {
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx }
    }
}

impl ModloaderInstaller for FabricInstaller {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderInstall,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, ProvisionResult<Entrypoint>> {
        Box::pin(install_fabric_server(&self.ctx, spec, reporter))
    }
}

pub async fn install_fabric_server(
    ctx: &LoaderContext,
    spec: &LoaderInstall,
    reporter: Arc<dyn ProgressReporter>,
) -> ProvisionResult<Entrypoint> {
    let server_dir = spec.server_dir.as_path();
    tokio::fs::create_dir_all(server_dir).await.at_path(server_dir)?;
    lay_down_archive(spec, &reporter, ctx.config.extract_progress_interval).await?;

    reporter.set_stage(InstallStage::InstallingLoader);
    let artifact = ctx
        .resolver
        .resolve(SoftwareType::Fabric, &spec.mc_version, spec.build.as_deref())
        .await?;
    reporter.set_status(&format!(
        "Downloading Fabric server launcher for {}...",
        artifact.version
    ));
    ctx.downloader
        .download(&artifact.url, &server_dir.join("server.jar"), reporter.as_ref())
        .await?;
    write_eula(server_dir).await?;

    log::info!(
        "Fabric loader {} for {} installed",
        artifact.build.as_deref().unwrap_or("?"),
        artifact.version
    );
    Ok(Entrypoint::ServerJar)
}
