//! System metrics snapshots
//!
//! AI-dynamic tasks name the metrics they care about as a comma-separated
//! list (`cpu_load,mem,disk:/var,load_avg,processes`). The collector gathers
//! only those and the snapshot is serialized to JSON for the command
//! generator.

mod collector;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scheduler::SchedulerResult;

pub use collector::SysinfoCollector;

/// A metric requested by a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricKind {
    /// Average CPU load in percent
    CpuLoad,
    /// Memory and swap usage
    Memory,
    /// Usage of the filesystem holding the path
    Disk(String),
    /// 1, 5 and 15 minute load averages
    LoadAverage,
    /// Running and total process counts
    Processes,
}

/// Parse a metric list. Unknown names are logged and skipped.
pub fn parse_metric_spec(spec: &str) -> Vec<MetricKind> {
    let mut kinds = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let kind = if token == "cpu_load" {
            MetricKind::CpuLoad
        } else if token.starts_with("mem") {
            MetricKind::Memory
        } else if let Some(path) = token.strip_prefix("disk:") {
            MetricKind::Disk(path.to_string())
        } else if token == "load_avg" {
            MetricKind::LoadAverage
        } else if token == "processes" {
            MetricKind::Processes
        } else {
            warn!("Unknown metric '{}' ignored", token);
            continue;
        };
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}

/// Memory figures in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total installed memory
    pub total: u64,
    /// Memory in use
    pub used: u64,
    /// Unused memory
    pub free: u64,
    /// Memory available for new allocations
    pub available: u64,
}

/// Swap figures in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapStats {
    /// Total swap
    pub total: u64,
    /// Unused swap
    pub free: u64,
}

/// Filesystem usage in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    /// Path that was asked for
    pub path: String,
    /// Mount point holding the path
    pub mount_point: String,
    /// Filesystem size
    pub total: u64,
    /// Space available to unprivileged users
    pub available: u64,
    /// Space in use
    pub used: u64,
}

/// Load averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    /// Last minute
    #[serde(rename = "1min")]
    pub one: f64,
    /// Last five minutes
    #[serde(rename = "5min")]
    pub five: f64,
    /// Last fifteen minutes
    #[serde(rename = "15min")]
    pub fifteen: f64,
}

/// Process counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Processes currently running
    pub running: usize,
    /// All processes
    pub total: usize,
}

/// Snapshot of the requested metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// CPU load in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_load_percent: Option<f32>,
    /// Memory usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStats>,
    /// Swap usage, collected with memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<SwapStats>,
    /// Disk usage for the requested path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskStats>,
    /// Load averages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_average: Option<LoadAverage>,
    /// Process counts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<ProcessStats>,
}

impl SystemMetrics {
    /// Pretty JSON sent to the command generator
    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Source of system snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Collect the metrics named in `spec`
    async fn collect(&self, spec: &str) -> SchedulerResult<SystemMetrics>;
}
