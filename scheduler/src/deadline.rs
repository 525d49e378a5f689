//! Per-task deadline tracking and SLA rescue actions.

use dslab_core::{log_debug, log_warn, SimulationContext};

use crate::config::SchedulerConfig;
use crate::host::{CpuArch, Host, MachineId, PState, SState, SlaClass, TaskId, VmId};
use crate::inventory::FleetInventory;

/// Core-owned record of one placed, not yet completed task.
pub struct ActiveTask {
    pub task: TaskId,
    pub sla: SlaClass,
    pub deadline: f64,
    pub vm: VmId,
    boosted: bool,
    late: bool,
}

#[derive(Default)]
pub struct DeadlineTracker {
    tasks: Vec<ActiveTask>,
}

impl DeadlineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, task: TaskId, sla: SlaClass, deadline: f64, vm: VmId) {
        self.tasks.push(ActiveTask {
            task,
            sla,
            deadline,
            vm,
            boosted: false,
            late: false,
        });
    }

    /// Drops the record for a completed task. Returns false when the task was
    /// never tracked.
    pub fn complete(&mut self, task: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.task != task);
        self.tasks.len() != before
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Periodic pass: re-estimate time to completion for every live task and
    /// boost machines hosting at-risk ones. Tasks already past their deadline
    /// are left alone; nothing the core does can recover them.
    pub fn check_deadlines(
        &mut self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        ctx: &SimulationContext,
    ) {
        let now = ctx.time();
        for record in &mut self.tasks {
            if host.is_task_completed(record.task) {
                continue;
            }
            if now > record.deadline {
                if !record.late {
                    record.late = true;
                    log_debug!(ctx, "task {} missed its deadline", record.task);
                }
                continue;
            }

            let info = host.task_info(record.task);
            if info.remaining_instructions == 0 {
                continue;
            }
            let Some(machine) = host.vm_info(record.vm).machine else {
                continue;
            };
            let snapshot = host.machine_info(machine);
            let mips = snapshot.mips.at(snapshot.p_state);
            let eta = info.remaining_instructions as f64 / (mips as f64 * 1e6);
            if eta >= (record.deadline - now) * config.deadline_slack {
                boost(host, machine);
                if !record.boosted {
                    record.boosted = true;
                    log_debug!(
                        ctx,
                        "boosted machine {} for at-risk task {}",
                        machine,
                        record.task
                    );
                }
            }
        }
    }

    /// Reactive pass: the host flagged a task as close to violation. Boost its
    /// machine immediately and, for a GPU-capable task stranded on a GPU-less
    /// machine, migrate its VM towards a GPU.
    pub fn on_sla_warning(
        &mut self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        task_id: TaskId,
        ctx: &SimulationContext,
    ) {
        let Some(index) = self.tasks.iter().position(|t| t.task == task_id) else {
            log_warn!(ctx, "sla warning for untracked task {}", task_id);
            return;
        };
        let vm = self.tasks[index].vm;
        if inventory.is_vm_migrating(vm) {
            return;
        }
        let Some(machine) = host.vm_info(vm).machine else {
            return;
        };
        boost(host, machine);
        self.tasks[index].boosted = true;

        if !config.gpu_rescue {
            return;
        }
        let info = host.task_info(task_id);
        if !info.gpu_capable || host.machine_info(machine).gpus {
            return;
        }
        // the whole vm moves, so the destination must take every task on it
        let vm_memory = self.vm_memory(host, vm);
        if let Some(dst) = gpu_refuge(config, host, inventory, info.required_cpu, vm_memory, machine)
        {
            log_debug!(
                ctx,
                "migrating vm {} to gpu machine {} for task {}",
                vm,
                dst,
                task_id
            );
            host.migrate_vm(vm, dst);
            inventory.mark_vm_migrating(vm, dst);
        }
    }

    /// Memory footprint of every live task sharing the VM.
    fn vm_memory(&self, host: &dyn Host, vm: VmId) -> u64 {
        self.tasks
            .iter()
            .filter(|t| t.vm == vm)
            .map(|t| host.task_info(t.task).required_memory)
            .sum()
    }
}

fn boost(host: &mut dyn Host, machine: MachineId) {
    host.set_core_performance(machine, 0, PState::P0);
}

/// First active GPU-bearing machine with room for the migrating VM's full
/// footprint, if any.
fn gpu_refuge(
    config: &SchedulerConfig,
    host: &dyn Host,
    inventory: &FleetInventory,
    cpu: CpuArch,
    vm_memory: u64,
    current: MachineId,
) -> Option<MachineId> {
    inventory
        .machines_by_cpu(cpu)
        .iter()
        .copied()
        .find(|&machine| {
            if machine == current || inventory.in_transition(machine) {
                return false;
            }
            let info = host.machine_info(machine);
            info.s_state == SState::S0
                && info.gpus
                && info.memory_used + vm_memory + config.vm_memory_overhead
                    <= info.memory_capacity
        })
}
