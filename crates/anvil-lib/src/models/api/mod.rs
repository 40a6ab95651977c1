//! Wire formats of the upstream metadata APIs.

pub mod fabric;
pub mod forge;
pub mod modrinth;
pub mod paper;
pub mod vanilla;
