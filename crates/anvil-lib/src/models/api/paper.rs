use serde::{Deserialize, Serialize};

/// PaperMC v2 `/projects/{project}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperProject {
    pub versions: Vec<String>,
}

/// PaperMC v2 `/projects/{project}/versions/{version}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperVersion {
    pub version: String,
    pub builds: Vec<u32>,
}

/// Purpur v2 `/purpur`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurpurProject {
    pub versions: Vec<String>,
}

/// Purpur v2 `/purpur/{version}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurpurVersion {
    pub version: String,
    pub builds: PurpurBuilds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurpurBuilds {
    pub latest: String,
    pub all: Vec<String>,
}
