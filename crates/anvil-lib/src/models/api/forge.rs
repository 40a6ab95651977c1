use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Forge `promotions_slim.json`: keys like `1.20.1-recommended`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PromotionsSlim {
    pub promos: HashMap<String, String>,
}

/// Maven `maven-metadata.xml`
#[derive(Serialize, Deserialize, Debug)]
pub struct MavenMetadata {
    pub versioning: Versioning,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Versioning {
    pub versions: Versions,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Versions {
    #[serde(default)]
    pub version: Vec<String>,
}
