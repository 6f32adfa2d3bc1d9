use async_trait::async_trait;
use std::path::Path;
use sysinfo::{Disks, ProcessStatus, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{debug, warn};

use super::{
    parse_metric_spec, DiskStats, LoadAverage, MemoryStats, MetricKind, MetricsCollector,
    ProcessStats, SwapStats, SystemMetrics,
};
use crate::scheduler::{SchedulerError, SchedulerResult};

/// Collector backed by the `sysinfo` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoCollector;

impl SysinfoCollector {
    /// Create a collector
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsCollector for SysinfoCollector {
    async fn collect(&self, spec: &str) -> SchedulerResult<SystemMetrics> {
        let kinds = parse_metric_spec(spec);
        if kinds.is_empty() {
            return Ok(SystemMetrics::default());
        }
        // sysinfo refreshes block, and CPU sampling sleeps between two reads
        tokio::task::spawn_blocking(move || snapshot(&kinds))
            .await
            .map_err(|e| SchedulerError::Execution(format!("metrics collection failed: {}", e)))
    }
}

fn snapshot(kinds: &[MetricKind]) -> SystemMetrics {
    let mut sys = System::new();
    let mut metrics = SystemMetrics::default();

    for kind in kinds {
        match kind {
            MetricKind::CpuLoad => {
                sys.refresh_cpu();
                std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
                sys.refresh_cpu();
                let count = sys.cpus().len().max(1);
                let load = sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / count as f32;
                metrics.cpu_load_percent = Some(load);
            }
            MetricKind::Memory => {
                sys.refresh_memory();
                metrics.memory = Some(MemoryStats {
                    total: sys.total_memory(),
                    used: sys.used_memory(),
                    free: sys.free_memory(),
                    available: sys.available_memory(),
                });
                metrics.swap = Some(SwapStats {
                    total: sys.total_swap(),
                    free: sys.free_swap(),
                });
            }
            MetricKind::Disk(path) => {
                metrics.disk = disk_usage(path);
            }
            MetricKind::LoadAverage => {
                let load = System::load_average();
                metrics.load_average = Some(LoadAverage {
                    one: load.one,
                    five: load.five,
                    fifteen: load.fifteen,
                });
            }
            MetricKind::Processes => {
                sys.refresh_processes();
                let running = sys
                    .processes()
                    .values()
                    .filter(|p| p.status() == ProcessStatus::Run)
                    .count();
                metrics.processes = Some(ProcessStats {
                    running,
                    total: sys.processes().len(),
                });
            }
        }
    }

    debug!("Collected metrics for {} kinds", kinds.len());
    metrics
}

/// Usage of the mount point with the longest prefix of `path`
fn disk_usage(path: &str) -> Option<DiskStats> {
    let disks = Disks::new_with_refreshed_list();
    let target = Path::new(path);
    let disk = disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match disk {
        Some(disk) => {
            let total = disk.total_space();
            let available = disk.available_space();
            Some(DiskStats {
                path: path.to_string(),
                mount_point: disk.mount_point().display().to_string(),
                total,
                available,
                used: total.saturating_sub(available),
            })
        }
        None => {
            warn!("No mounted filesystem found for '{}'", path);
            None
        }
    }
}
