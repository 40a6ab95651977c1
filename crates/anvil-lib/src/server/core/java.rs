use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::traits::JavaProvider;
use crate::error::{ProvisionError, ProvisionResult};

#[cfg(windows)]
const JAVA_BINARY: &str = "java.exe";
#[cfg(not(windows))]
const JAVA_BINARY: &str = "java";

/// Finds Java on the host: configured per-version paths, then `JAVA_HOME`, then `PATH`.
///
/// The host is responsible for having a suitable runtime installed; this provider
/// never downloads one.
#[derive(Debug, Clone, Default)]
pub struct SystemJavaProvider {
    overrides: HashMap<String, PathBuf>,
}

impl SystemJavaProvider {
    pub fn new(overrides: HashMap<String, PathBuf>) -> Self {
        Self { overrides }
    }

    fn locate(&self, label: &str) -> ProvisionResult<PathBuf> {
        if let Some(path) = self.overrides.get(label) {
            if path.is_file() {
                log::debug!("Using configured Java {} at {:?}", label, path);
                return Ok(path.clone());
            }
            return Err(ProvisionError::JavaUnavailable {
                label: label.to_string(),
                message: format!("configured path {:?} does not exist", path),
            });
        }

        if let Some(home) = std::env::var_os("JAVA_HOME") {
            let candidate = java_in_home(Path::new(&home));
            if candidate.is_file() {
                log::debug!("Using Java from JAVA_HOME: {:?}", candidate);
                return Ok(candidate);
            }
        }

        which::which(JAVA_BINARY).map_err(|e| ProvisionError::JavaUnavailable {
            label: label.to_string(),
            message: format!("no override configured and `java` not found on PATH ({})", e),
        })
    }
}

fn java_in_home(home: &Path) -> PathBuf {
    home.join("bin").join(JAVA_BINARY)
}

impl JavaProvider for SystemJavaProvider {
    fn ensure_java<'a>(&'a self, label: &'a str) -> BoxFuture<'a, ProvisionResult<PathBuf>> {
        Box::pin(async move {
            let path = self.locate(label)?;
            Ok(dunce::canonicalize(&path).unwrap_or(path))
        })
    }
}
