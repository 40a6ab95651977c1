pub mod core;
pub mod engine;
pub mod loaders;
pub mod modpack;
pub mod resolver;
pub mod types;

pub use engine::ProvisioningEngine;

#[cfg(test)]
pub(crate) mod testing;
