//! Provisioning engine for Minecraft dedicated servers.
//!
//! Resolves an upstream build for the requested server software, downloads and
//! unpacks it into a target directory, runs loader installers where needed and
//! reports the resulting launch entrypoint.

pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod utils;

pub use config::ProvisionerConfig;
pub use error::{InstallFailure, ProvisionError, ProvisionResult};
pub use server::engine::ProvisioningEngine;
pub use server::types::{
    ChannelProgressReporter, Entrypoint, InstallRequest, InstallStage, ProgressReporter,
    ProvisionEvent, SilentProgressReporter, SoftwareType,
};
