// src/utils/system.rs: System functions

use std::time::Duration;

use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines number of cores the external tools may use.
///
/// # Arguments
///
/// * `max_threads` - Upper bound from the command line.
///
/// # Returns
///
/// (usize, f32) usable cores (at least 1), current cpu usage
pub async fn detect_cores_and_load(max_threads: usize) -> (usize, f32) {
    let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_usage();
    sleep(Duration::from_millis(100)).await;
    system.refresh_cpu_usage();
    let cpu_load = system.global_cpu_usage();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    (resolve_core_count(physical_cores, max_threads), cpu_load)
}

fn resolve_core_count(physical_cores: usize, max_threads: usize) -> usize {
    physical_cores.min(max_threads).max(1)
}
