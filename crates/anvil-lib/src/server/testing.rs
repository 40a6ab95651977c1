use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use super::types::{InstallStage, ProgressReporter};

/// In-memory reporter that keeps the progress updates it receives.
#[derive(Default)]
pub struct RecordingReporter {
    progress: Mutex<Vec<(u64, Option<u64>, Option<u8>)>>,
}

impl RecordingReporter {
    pub fn progress(&self) -> Vec<(u64, Option<u64>, Option<u8>)> {
        self.progress.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn set_status(&self, _message: &str) {}

    fn set_stage(&self, _stage: InstallStage) {}

    fn update_progress(&self, current: u64, total: Option<u64>, percent: Option<u8>) {
        self.progress.lock().unwrap().push((current, total, percent));
    }

    fn installer_output(&self, _line: &str) {}

    fn done(&self, _success: bool, _message: Option<&str>) {}
}

/// Write a zip at `path` from `(name, contents)` pairs. Names ending in `/` become
/// directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, contents) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
    }
    zip.finish().unwrap();
}
