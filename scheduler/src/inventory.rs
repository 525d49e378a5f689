//! Fleet inventory: id-level bookkeeping for machines and VMs.
//!
//! Only identifiers and transient markers live here. Capacities, loads and
//! states are mutated by the host as tasks run, so they are re-queried through
//! [`Host`](crate::host::Host) whenever freshness matters instead of being
//! cached.

use rustc_hash::FxHashMap;

use crate::host::{CpuArch, MachineId, SState, VmId};

#[derive(Default)]
pub struct FleetInventory {
    machines: Vec<MachineId>,
    by_cpu: FxHashMap<CpuArch, Vec<MachineId>>,
    vms: Vec<VmId>,
    // requested S-state per machine, present until the host acknowledges
    transitions: FxHashMap<MachineId, SState>,
    // migration destination per VM, present until MigrationDone
    migrating: FxHashMap<VmId, MachineId>,
}

impl FleetInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_machine(&mut self, cpu: CpuArch, machine: MachineId) {
        self.machines.push(machine);
        self.by_cpu.entry(cpu).or_default().push(machine);
    }

    /// All machines in host enumeration order.
    pub fn machines(&self) -> &[MachineId] {
        &self.machines
    }

    pub fn machines_by_cpu(&self, cpu: CpuArch) -> &[MachineId] {
        self.by_cpu.get(&cpu).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn register_vm(&mut self, vm: VmId) {
        self.vms.push(vm);
    }

    /// VMs created by the core, in creation order.
    pub fn vms(&self) -> &[VmId] {
        &self.vms
    }

    pub fn drain_vms(&mut self) -> Vec<VmId> {
        std::mem::take(&mut self.vms)
    }

    /// Records an issued S-state request; the machine is excluded from every
    /// selection pass until [`finish_transition`](Self::finish_transition).
    pub fn begin_transition(&mut self, machine: MachineId, target: SState) {
        self.transitions.insert(machine, target);
    }

    pub fn finish_transition(&mut self, machine: MachineId) -> Option<SState> {
        self.transitions.remove(&machine)
    }

    pub fn in_transition(&self, machine: MachineId) -> bool {
        self.transitions.contains_key(&machine)
    }

    pub fn transition_target(&self, machine: MachineId) -> Option<SState> {
        self.transitions.get(&machine).copied()
    }

    pub fn mark_vm_migrating(&mut self, vm: VmId, dst: MachineId) {
        self.migrating.insert(vm, dst);
    }

    pub fn mark_vm_settled(&mut self, vm: VmId) -> Option<MachineId> {
        self.migrating.remove(&vm)
    }

    pub fn is_vm_migrating(&self, vm: VmId) -> bool {
        self.migrating.contains_key(&vm)
    }
}
