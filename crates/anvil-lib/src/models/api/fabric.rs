use serde::{Deserialize, Serialize};

/// Entry of `/v2/versions/loader/{game_version}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderForGame {
    pub loader: LoaderVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderVersion {
    pub version: String,
    pub stable: Option<bool>,
}

/// Entry of `/v2/versions/installer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerVersion {
    pub version: String,
    pub stable: Option<bool>,
}

/// Entry of `/v2/versions/game`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameVersion {
    pub version: String,
    pub stable: bool,
}
