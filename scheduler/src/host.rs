//! Identifiers, fleet state types and the host-side interface.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical machine identifier issued by the host.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct MachineId(pub u32);

/// Virtual machine identifier issued by the host.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct VmId(pub u32);

/// Task identifier issued by the host.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CpuArch {
    X86,
    Power,
    Arm,
    Riscv,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GuestOs {
    Linux,
    LinuxRt,
    Win,
    Aix,
}

/// ACPI sleep ladder. The core only drives S0 and S5, but host snapshots may
/// report any level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SState {
    S0,
    S0i1,
    S1,
    S2,
    S3,
    S4,
    S5,
}

/// Performance states, P0 fastest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PState {
    P0,
    P1,
    P2,
    P3,
}

/// Achievable MIPS per P-state.
#[derive(Clone, Copy, Debug)]
pub struct PerfProfile(pub [u64; 4]);

impl PerfProfile {
    pub fn at(&self, p_state: PState) -> u64 {
        self.0[p_state as usize]
    }

    pub fn peak(&self) -> u64 {
        self.at(PState::P0)
    }
}

/// Service classes, SLA0 strictest. SLA3 carries no violation penalty.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SlaClass {
    Sla0,
    Sla1,
    Sla2,
    Sla3,
}

impl SlaClass {
    /// Classes that count against the violation report.
    pub fn penalized() -> [SlaClass; 3] {
        [SlaClass::Sla0, SlaClass::Sla1, SlaClass::Sla2]
    }
}

impl fmt::Display for SlaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlaClass::Sla0 => "SLA0",
            SlaClass::Sla1 => "SLA1",
            SlaClass::Sla2 => "SLA2",
            SlaClass::Sla3 => "SLA3",
        };
        write!(f, "{}", name)
    }
}

/// Point-in-time view of one machine, fetched from the host whenever
/// freshness matters.
#[derive(Clone, Debug)]
pub struct MachineSnapshot {
    pub id: MachineId,
    pub cpu: CpuArch,
    pub s_state: SState,
    pub p_state: PState,
    pub memory_capacity: u64,
    pub memory_used: u64,
    pub num_cores: u32,
    pub active_tasks: u32,
    pub active_vms: u32,
    pub gpus: bool,
    pub mips: PerfProfile,
}

/// Point-in-time view of one VM. `machine` is `None` while the VM is detached
/// mid-migration.
#[derive(Clone, Debug)]
pub struct VmSnapshot {
    pub id: VmId,
    pub guest: GuestOs,
    pub machine: Option<MachineId>,
    pub active_tasks: u32,
}

#[derive(Clone, Debug)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub required_cpu: CpuArch,
    pub required_guest: GuestOs,
    pub required_memory: u64,
    pub priority: u32,
    pub sla: SlaClass,
    pub arrival: f64,
    pub target_completion: f64,
    pub remaining_instructions: u64,
    pub gpu_capable: bool,
}

/// Operations the host platform provides to the core.
///
/// Queries are pure reads of the host's authoritative tables. `set_machine_state`
/// and `migrate_vm` are requests with asynchronous acknowledgements, delivered
/// later as [`StateChangeComplete`](crate::events::StateChangeComplete) and
/// [`MigrationDone`](crate::events::MigrationDone) events; until the
/// acknowledgement arrives the affected entity is in a transient state.
/// `set_core_performance` applies synchronously and `core = 0` broadcasts to
/// all cores.
pub trait Host {
    fn machine_count(&self) -> usize;
    fn machine_info(&self, id: MachineId) -> MachineSnapshot;
    fn vm_info(&self, id: VmId) -> VmSnapshot;
    fn task_info(&self, id: TaskId) -> TaskSnapshot;
    fn is_task_completed(&self, id: TaskId) -> bool;

    fn set_machine_state(&mut self, id: MachineId, state: SState);
    fn set_core_performance(&mut self, id: MachineId, core: u32, p_state: PState);

    fn create_vm(&mut self, guest: GuestOs, cpu: CpuArch) -> VmId;
    fn attach_vm(&mut self, vm: VmId, machine: MachineId);
    fn add_task(&mut self, vm: VmId, task: TaskId, priority: u32);
    fn migrate_vm(&mut self, vm: VmId, dst: MachineId);
    fn shutdown_vm(&mut self, vm: VmId);

    fn sla_report(&self, class: SlaClass) -> f64;
    fn cluster_energy(&self) -> f64;
}
