//! Three-tier task placement.

use dslab_core::{log_debug, log_warn, SimulationContext};

use crate::config::SchedulerConfig;
use crate::host::{Host, MachineSnapshot, PState, SState, SlaClass, TaskSnapshot, VmId};
use crate::inventory::FleetInventory;
use crate::provisioner::Provisioner;

/// Outcome of one placement attempt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Placement {
    /// Task was added to this VM and must be tracked until completion.
    Placed(VmId),
    /// Capacity for the task is already warming up; the host's next event may
    /// retry.
    Deferred,
    /// All three tiers are exhausted.
    Unplaceable,
}

/// Candidate score for reusing an existing VM. Lower wins; NaN is worst.
///
/// The product balances machine load, discounts machines currently throttled
/// below P0, and rewards a GPU fit for GPU-capable tasks.
pub fn placement_score(
    task: &TaskSnapshot,
    machine: &MachineSnapshot,
    gpu_discount: f64,
) -> f64 {
    let load = machine.active_tasks as f64 / machine.num_cores as f64;
    let speed_ratio = machine.mips.peak() as f64 / machine.mips.at(machine.p_state) as f64;
    let gpu_factor = if task.gpu_capable && machine.gpus {
        gpu_discount
    } else {
        1.0
    };
    let score = load * speed_ratio * gpu_factor;
    if score.is_nan() {
        f64::INFINITY
    } else {
        score
    }
}

pub struct PlacementEngine;

impl PlacementEngine {
    /// Places a task: reuse the best matching VM, else create a VM on an
    /// active machine, else wake a dormant one. On success the task has been
    /// added to the returned VM.
    pub fn place(
        &self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        provisioner: &Provisioner,
        task: &TaskSnapshot,
        ctx: &SimulationContext,
    ) -> Placement {
        if let Some(vm) = self.best_existing_vm(config, host, inventory, task) {
            host.add_task(vm, task.id, task.priority);
            return Placement::Placed(vm);
        }
        if let Some(vm) = self.grow_on_active(config, host, inventory, provisioner, task, ctx) {
            host.add_task(vm, task.id, task.priority);
            return Placement::Placed(vm);
        }
        self.wake_dormant(config, host, inventory, provisioner, task, ctx)
    }

    /// Tier 1: scored scan over every VM the core created.
    fn best_existing_vm(
        &self,
        config: &SchedulerConfig,
        host: &dyn Host,
        inventory: &FleetInventory,
        task: &TaskSnapshot,
    ) -> Option<VmId> {
        let mut best: Option<(f64, VmId)> = None;
        for &vm in inventory.vms() {
            if inventory.is_vm_migrating(vm) {
                continue;
            }
            let vm_info = host.vm_info(vm);
            if vm_info.guest != task.required_guest {
                continue;
            }
            let Some(machine) = vm_info.machine else {
                continue;
            };
            if inventory.in_transition(machine) {
                continue;
            }
            let info = host.machine_info(machine);
            if info.s_state != SState::S0 || info.cpu != task.required_cpu {
                continue;
            }
            if !fits_memory(config, &info, task) {
                continue;
            }

            let score = placement_score(task, &info, config.gpu_discount);
            let better = match best {
                None => true,
                Some((best_score, best_vm)) => {
                    score < best_score || (score == best_score && vm < best_vm)
                }
            };
            if better {
                best = Some((score, vm));
            }
        }
        best.map(|(_, vm)| vm)
    }

    /// Tier 2: first active machine with matching CPU and room for a fresh VM.
    fn grow_on_active(
        &self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        provisioner: &Provisioner,
        task: &TaskSnapshot,
        ctx: &SimulationContext,
    ) -> Option<VmId> {
        let candidates = inventory.machines_by_cpu(task.required_cpu).to_vec();
        for machine in candidates {
            if inventory.in_transition(machine) {
                continue;
            }
            let info = host.machine_info(machine);
            if info.s_state != SState::S0 || !fits_memory(config, &info, task) {
                continue;
            }

            // strictest tasks should not land on a throttled machine
            if task.sla == SlaClass::Sla0 && info.p_state > PState::P1 {
                host.set_core_performance(machine, 0, PState::P1);
            }
            let vm = provisioner.vm_on_active(host, inventory, machine, task.required_guest, task.required_cpu);
            log_debug!(
                ctx,
                "created {:?} vm {} on machine {} for task {}",
                task.required_guest,
                vm,
                machine,
                task.id
            );
            return Some(vm);
        }
        None
    }

    /// Tier 3: wake the first dormant machine with matching CPU. The task is
    /// placed optimistically; the host buffers it until the machine is up.
    fn wake_dormant(
        &self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        provisioner: &Provisioner,
        task: &TaskSnapshot,
        ctx: &SimulationContext,
    ) -> Placement {
        let candidates = inventory.machines_by_cpu(task.required_cpu).to_vec();
        let mut warming = false;
        for machine in candidates {
            if inventory.transition_target(machine) == Some(SState::S0) {
                warming = true;
                continue;
            }
            if inventory.in_transition(machine) {
                continue;
            }
            let info = host.machine_info(machine);
            if info.s_state != SState::S5 || !fits_memory(config, &info, task) {
                continue;
            }

            let vm = provisioner.wake(host, inventory, machine, task.required_guest, task.required_cpu);
            host.add_task(vm, task.id, task.priority);
            log_debug!(
                ctx,
                "waking machine {} with vm {} for task {}",
                machine,
                vm,
                task.id
            );
            return Placement::Placed(vm);
        }

        if warming {
            log_debug!(ctx, "task {} deferred, capacity is warming up", task.id);
            Placement::Deferred
        } else {
            log_warn!(ctx, "task {} is unplaceable, all tiers exhausted", task.id);
            Placement::Unplaceable
        }
    }
}

fn fits_memory(config: &SchedulerConfig, machine: &MachineSnapshot, task: &TaskSnapshot) -> bool {
    machine.memory_used + task.required_memory + config.vm_memory_overhead
        <= machine.memory_capacity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CpuArch, GuestOs, MachineId, PerfProfile, SlaClass, TaskId};

    fn machine(active_tasks: u32, p_state: PState, gpus: bool) -> MachineSnapshot {
        MachineSnapshot {
            id: MachineId(0),
            cpu: CpuArch::X86,
            s_state: SState::S0,
            p_state,
            memory_capacity: 16384,
            memory_used: 0,
            num_cores: 4,
            active_tasks,
            active_vms: 1,
            gpus,
            mips: PerfProfile([2000, 1500, 1000, 500]),
        }
    }

    fn task(gpu_capable: bool) -> TaskSnapshot {
        TaskSnapshot {
            id: TaskId(0),
            required_cpu: CpuArch::X86,
            required_guest: GuestOs::Linux,
            required_memory: 512,
            priority: 1,
            sla: SlaClass::Sla2,
            arrival: 0.0,
            target_completion: 100.0,
            remaining_instructions: 1_000_000,
            gpu_capable,
        }
    }

    #[test]
    fn score_penalizes_throttled_machines() {
        let idle = placement_score(&task(false), &machine(2, PState::P0, false), 0.5);
        let throttled = placement_score(&task(false), &machine(2, PState::P3, false), 0.5);
        assert_eq!(idle, 0.5);
        assert_eq!(throttled, 2.0);
    }

    #[test]
    fn score_rewards_gpu_fit() {
        let plain = placement_score(&task(true), &machine(2, PState::P0, false), 0.5);
        let gpu = placement_score(&task(true), &machine(2, PState::P0, true), 0.5);
        assert_eq!(gpu, plain * 0.5);
    }

    #[test]
    fn nan_score_is_worst() {
        let mut snapshot = machine(0, PState::P0, false);
        snapshot.num_cores = 0;
        assert_eq!(
            placement_score(&task(false), &snapshot, 0.5),
            f64::INFINITY
        );
    }
}
