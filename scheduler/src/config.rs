//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// How many machines the init protocol may power on across all CPU groups.
pub const ACTIVE_MACHINES_BUDGET: usize = 64;

/// Memory charged against a machine for every VM instantiated on it, in the
/// host's memory units. The host defines the real tax; this is the default
/// the core assumes when none is configured.
pub const VM_MEMORY_OVERHEAD: u64 = 8;

/// Score multiplier for a GPU-capable task landing on a GPU machine.
pub const GPU_SPEEDUP_DISCOUNT: f64 = 0.5;

/// Fraction of the remaining deadline window the estimated completion time
/// may consume before the hosting machine is boosted.
pub const DEADLINE_SLACK: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_machine_budget")]
    pub active_machine_budget: usize,
    #[serde(default = "default_vm_overhead")]
    pub vm_memory_overhead: u64,
    #[serde(default = "default_gpu_discount")]
    pub gpu_discount: f64,
    #[serde(default = "default_deadline_slack")]
    pub deadline_slack: f64,
    /// Send idle machines to S5 on the periodic tick. Off in the
    /// energy-conservative preset.
    #[serde(default)]
    pub consolidate_idle: bool,
    /// Allow SLA warnings to trigger migration of GPU-capable tasks onto
    /// GPU-bearing machines.
    #[serde(default = "default_gpu_rescue")]
    pub gpu_rescue: bool,
}

fn default_machine_budget() -> usize {
    ACTIVE_MACHINES_BUDGET
}

fn default_vm_overhead() -> u64 {
    VM_MEMORY_OVERHEAD
}

fn default_gpu_discount() -> f64 {
    GPU_SPEEDUP_DISCOUNT
}

fn default_deadline_slack() -> f64 {
    DEADLINE_SLACK
}

fn default_gpu_rescue() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            active_machine_budget: default_machine_budget(),
            vm_memory_overhead: default_vm_overhead(),
            gpu_discount: default_gpu_discount(),
            deadline_slack: default_deadline_slack(),
            consolidate_idle: false,
            gpu_rescue: default_gpu_rescue(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(file_name: &str) -> Self {
        serde_yaml::from_str(
            &std::fs::read_to_string(file_name)
                .unwrap_or_else(|_| panic!("can't read config file {}", file_name)),
        )
        .unwrap_or_else(|e| panic!("can't parse config file {}: {}", file_name, e))
    }
}
