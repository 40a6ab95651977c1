use once_cell::sync::Lazy;
use std::sync::Mutex;
use sysinfo::System;

static SYSTEM: Lazy<Mutex<System>> = Lazy::new(|| {
    let mut sys = System::new();
    sys.refresh_memory();
    Mutex::new(sys)
});

const MIN_HEAP_MB: u64 = 2048;
const MAX_HEAP_MB: u64 = 8192;

/// Returns the total physical memory in Megabytes
pub fn get_total_memory_mb() -> u64 {
    match SYSTEM.lock() {
        Ok(mut sys) => {
            sys.refresh_memory();
            sys.total_memory() / 1024 / 1024
        }
        Err(_) => 0,
    }
}

/// Heap ceiling for a freshly provisioned server: half of RAM, clamped to 2-8 GiB.
pub fn default_heap_mb(total_memory_mb: u64) -> u64 {
    (total_memory_mb / 2).clamp(MIN_HEAP_MB, MAX_HEAP_MB)
}

/// Default `user_jvm_args.txt` contents for loader-generated run scripts.
pub fn default_jvm_args(total_memory_mb: u64) -> String {
    let max = default_heap_mb(total_memory_mb);
    format!("-Xms{}M\n-Xmx{}M\n", (max / 2).max(1024), max)
}
