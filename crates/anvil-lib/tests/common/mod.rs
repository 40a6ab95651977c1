#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anvil_lib::error::ProvisionResult;
use anvil_lib::server::core::JavaProvider;
use anvil_lib::{InstallStage, ProgressReporter, ProvisionerConfig};
use futures::future::BoxFuture;

#[derive(Default)]
pub struct RecordingReporter {
    stages: Mutex<Vec<InstallStage>>,
    output: Mutex<Vec<String>>,
    done: Mutex<Option<bool>>,
}

impl RecordingReporter {
    pub fn stages(&self) -> Vec<InstallStage> {
        self.stages.lock().unwrap().clone()
    }

    pub fn output(&self) -> Vec<String> {
        self.output.lock().unwrap().clone()
    }

    pub fn finished_with(&self) -> Option<bool> {
        *self.done.lock().unwrap()
    }
}

impl ProgressReporter for RecordingReporter {
    fn set_status(&self, _message: &str) {}

    fn set_stage(&self, stage: InstallStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn update_progress(&self, _current: u64, _total: Option<u64>, _percent: Option<u8>) {}

    fn installer_output(&self, line: &str) {
        self.output.lock().unwrap().push(line.to_string());
    }

    fn done(&self, success: bool, _message: Option<&str>) {
        *self.done.lock().unwrap() = Some(success);
    }
}

/// Always hands out the same executable.
pub struct FixedJava(pub PathBuf);

impl JavaProvider for FixedJava {
    fn ensure_java<'a>(&'a self, _label: &'a str) -> BoxFuture<'a, ProvisionResult<PathBuf>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// Zip bytes from `(name, contents)` pairs; names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, contents) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let entries: Vec<(&str, &[u8])> = entries.iter().map(|(n, c)| (*n, c.as_bytes())).collect();
    std::fs::write(path, zip_bytes(&entries)).unwrap();
}

/// Settings with every upstream pointed at `base` and no retry delay.
pub fn config_for(base: &str) -> ProvisionerConfig {
    ProvisionerConfig {
        mojang_manifest_url: format!("{}/mojang/version_manifest_v2.json", base),
        paper_api_url: format!("{}/paper", base),
        purpur_api_url: format!("{}/purpur", base),
        spigot_download_template: format!("{}/spigot/spigot-{{version}}.jar", base),
        fabric_meta_url: format!("{}/fabric/v2", base),
        forge_promotions_url: format!("{}/forge/promotions_slim.json", base),
        forge_maven_url: format!("{}/forge-maven/", base),
        neoforge_maven_url: format!("{}/neo-maven/", base),
        modrinth_api_url: format!("{}/modrinth/v2", base),
        bedrock_page_template: format!("{}/{{locale}}/download/server/bedrock", base),
        bedrock_download_template: format!(
            "{}/bin-{{platform}}/bedrock-server-{{version}}.zip",
            base
        ),
        bedrock_locales: vec!["en-us".to_string()],
        bedrock_fallback_versions: vec!["1.20.0.01".to_string()],
        download_attempts: 2,
        retry_delay_ms: 0,
        installer_timeout_secs: Some(60),
        ..ProvisionerConfig::default()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
