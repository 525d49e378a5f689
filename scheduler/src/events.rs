//! Events the host delivers to the scheduler.

use serde::Serialize;

use crate::host::{MachineId, TaskId, VmId};

#[derive(Clone, Serialize)]
pub struct NewTask {
    pub task_id: TaskId,
}

#[derive(Clone, Serialize)]
pub struct TaskCompleted {
    pub task_id: TaskId,
}

/// Periodic tick for deadline re-estimation and DVFS.
#[derive(Clone, Serialize)]
pub struct SchedulerCheck {}

#[derive(Clone, Serialize)]
pub struct SlaWarning {
    pub task_id: TaskId,
}

/// Memory overcommit detected by the host on `machine_id`.
#[derive(Clone, Serialize)]
pub struct MemoryWarning {
    pub machine_id: MachineId,
}

/// Acknowledgement of an earlier `migrate_vm` request.
#[derive(Clone, Serialize)]
pub struct MigrationDone {
    pub vm_id: VmId,
}

/// Acknowledgement of an earlier `set_machine_state` request.
#[derive(Clone, Serialize)]
pub struct StateChangeComplete {
    pub machine_id: MachineId,
}

#[derive(Clone, Serialize)]
pub struct SimulationComplete {}
