use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ProvisionResult;
use crate::server::loaders::LoaderInstall;
use crate::server::types::{Entrypoint, ProgressReporter};

/// Trait for modloader installers.
/// Each loader (Forge, NeoForge, Fabric) turns a prepared server directory into a
/// runnable one and reports how to start it.
pub trait ModloaderInstaller: Send + Sync {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderInstall,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, ProvisionResult<Entrypoint>>;
}

/// Supplies a Java executable for a major version label such as "17".
/// Provisioning of the runtime itself is the host's business.
pub trait JavaProvider: Send + Sync {
    fn ensure_java<'a>(&'a self, label: &'a str) -> BoxFuture<'a, ProvisionResult<PathBuf>>;
}

/// Decides whether a user-supplied build identifier may be used in URLs and paths.
pub trait BuildIdValidator: Send + Sync {
    fn validate_build_id(&self, build: &str) -> bool;
}
