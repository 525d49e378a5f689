//! Minimal in-memory host platform: owns the hardware tables, completes
//! tasks, acknowledges state changes and migrations asynchronously, and
//! accumulates cluster energy.

use std::collections::HashMap;

use dslab_core::{cast, log_debug, Event, EventHandler, Id, SimulationContext};
use serde::Serialize;

use sla_scheduling::events::{
    MigrationDone, SchedulerCheck, SimulationComplete, SlaWarning, StateChangeComplete,
    TaskCompleted,
};
use sla_scheduling::host::{
    CpuArch, GuestOs, Host, MachineId, MachineSnapshot, PState, PerfProfile, SState, SlaClass,
    TaskId, TaskSnapshot, VmId, VmSnapshot,
};

pub const STATE_CHANGE_DELAY: f64 = 0.5;
pub const MIGRATION_DELAY: f64 = 2.0;
pub const CHECK_INTERVAL: f64 = 5.0;

const IDLE_WATTS: f64 = 100.0;
const ACTIVE_WATTS: f64 = 200.0;

#[derive(Clone, Serialize)]
struct TaskDone {
    task_id: TaskId,
}

#[derive(Clone, Serialize)]
struct StateSettled {
    machine_id: MachineId,
}

#[derive(Clone, Serialize)]
struct MigrationSettled {
    vm_id: VmId,
}

#[derive(Clone, Serialize)]
struct PeriodicTick {}

struct DemoMachine {
    cpu: CpuArch,
    s_state: SState,
    p_state: PState,
    requested_state: Option<SState>,
    memory_capacity: u64,
    memory_used: u64,
    num_cores: u32,
    active_tasks: u32,
    active_vms: u32,
    gpus: bool,
    mips: PerfProfile,
    watt_seconds: f64,
    last_energy_update: f64,
}

impl DemoMachine {
    fn power_draw(&self) -> f64 {
        if self.s_state != SState::S0 {
            return 0.0;
        }
        let utilization = (self.active_tasks as f64 / self.num_cores as f64).min(1.0);
        let p_factor = match self.p_state {
            PState::P0 => 1.0,
            PState::P1 => 0.8,
            PState::P2 => 0.6,
            PState::P3 => 0.45,
        };
        IDLE_WATTS + ACTIVE_WATTS * utilization * p_factor
    }
}

struct DemoVm {
    guest: GuestOs,
    machine: Option<MachineId>,
    pending_dst: Option<MachineId>,
    tasks: Vec<TaskId>,
}

struct DemoTask {
    snapshot: TaskSnapshot,
    completed: bool,
}

pub struct FleetHost {
    machines: Vec<DemoMachine>,
    vms: Vec<DemoVm>,
    tasks: HashMap<TaskId, DemoTask>,
    vm_overhead: u64,

    scheduler_id: Id,
    outstanding: usize,
    sla_totals: [u32; 4],
    sla_late: [u32; 4],
    shutdown_vms: usize,

    ctx: SimulationContext,
}

impl FleetHost {
    pub fn new(ctx: SimulationContext, vm_overhead: u64) -> FleetHost {
        FleetHost {
            machines: Vec::new(),
            vms: Vec::new(),
            tasks: HashMap::new(),
            vm_overhead,
            scheduler_id: u32::MAX, // must be set later
            outstanding: 0,
            sla_totals: [0; 4],
            sla_late: [0; 4],
            shutdown_vms: 0,
            ctx,
        }
    }

    pub fn set_scheduler(&mut self, scheduler_id: Id) {
        self.scheduler_id = scheduler_id;
    }

    pub fn add_machine(
        &mut self,
        cpu: CpuArch,
        num_cores: u32,
        memory_capacity: u64,
        gpus: bool,
        mips: [u64; 4],
    ) -> MachineId {
        self.machines.push(DemoMachine {
            cpu,
            s_state: SState::S0,
            p_state: PState::P0,
            requested_state: None,
            memory_capacity,
            memory_used: 0,
            num_cores,
            active_tasks: 0,
            active_vms: 0,
            gpus,
            mips: PerfProfile(mips),
            watt_seconds: 0.0,
            last_energy_update: 0.0,
        });
        MachineId(self.machines.len() as u32 - 1)
    }

    pub fn submit(&mut self, snapshot: TaskSnapshot) {
        self.outstanding += 1;
        self.sla_totals[snapshot.sla as usize] += 1;
        self.tasks.insert(
            snapshot.id,
            DemoTask {
                snapshot,
                completed: false,
            },
        );
    }

    pub fn start(&mut self) {
        self.ctx.emit_self_now(PeriodicTick {});
    }

    fn settle_energy(&mut self, machine: MachineId) {
        let now = self.ctx.time();
        let record = &mut self.machines[machine.0 as usize];
        record.watt_seconds += record.power_draw() * (now - record.last_energy_update);
        record.last_energy_update = now;
    }

    fn vm_footprint(&self, vm: VmId) -> (u32, u64) {
        let record = &self.vms[vm.0 as usize];
        let memory = record
            .tasks
            .iter()
            .map(|t| self.tasks[t].snapshot.required_memory)
            .sum::<u64>();
        (record.tasks.len() as u32, self.vm_overhead + memory)
    }

    fn on_task_done(&mut self, task_id: TaskId) {
        let now = self.ctx.time();
        let (sla, deadline, memory) = {
            let task = self.tasks.get_mut(&task_id).unwrap();
            task.completed = true;
            (
                task.snapshot.sla,
                task.snapshot.target_completion,
                task.snapshot.required_memory,
            )
        };
        if now > deadline {
            self.sla_late[sla as usize] += 1;
        }

        if let Some(vm) = self
            .vms
            .iter()
            .position(|vm| vm.tasks.contains(&task_id))
            .map(|i| VmId(i as u32))
        {
            let machine = self.vms[vm.0 as usize].machine;
            if let Some(machine) = machine {
                self.settle_energy(machine);
                let record = &mut self.machines[machine.0 as usize];
                record.active_tasks -= 1;
                record.memory_used -= memory;
            }
            let record = &mut self.vms[vm.0 as usize];
            record.tasks.retain(|&t| t != task_id);
        }

        self.ctx
            .emit_now(TaskCompleted { task_id }, self.scheduler_id);

        self.outstanding -= 1;
        if self.outstanding == 0 {
            log_debug!(self.ctx, "workload drained, reporting");
            self.ctx.emit_now(SimulationComplete {}, self.scheduler_id);
        }
    }

    fn on_state_settled(&mut self, machine_id: MachineId) {
        self.settle_energy(machine_id);
        let record = &mut self.machines[machine_id.0 as usize];
        if let Some(state) = record.requested_state.take() {
            record.s_state = state;
        }
        self.ctx
            .emit_now(StateChangeComplete { machine_id }, self.scheduler_id);
    }

    fn on_migration_settled(&mut self, vm_id: VmId) {
        let (tasks, memory) = self.vm_footprint(vm_id);
        let Some(dst) = self.vms[vm_id.0 as usize].pending_dst.take() else {
            return;
        };
        self.vms[vm_id.0 as usize].machine = Some(dst);
        self.settle_energy(dst);
        let machine = &mut self.machines[dst.0 as usize];
        machine.active_vms += 1;
        machine.active_tasks += tasks;
        machine.memory_used += memory;
        self.ctx.emit_now(MigrationDone { vm_id }, self.scheduler_id);
    }

    fn on_periodic_tick(&mut self) {
        self.ctx.emit_now(SchedulerCheck {}, self.scheduler_id);
        if self.outstanding > 0 {
            self.ctx.emit_self(PeriodicTick {}, CHECK_INTERVAL);
        }
    }
}

impl Host for FleetHost {
    fn machine_count(&self) -> usize {
        self.machines.len()
    }

    fn machine_info(&self, id: MachineId) -> MachineSnapshot {
        let m = &self.machines[id.0 as usize];
        MachineSnapshot {
            id,
            cpu: m.cpu,
            s_state: m.s_state,
            p_state: m.p_state,
            memory_capacity: m.memory_capacity,
            memory_used: m.memory_used,
            num_cores: m.num_cores,
            active_tasks: m.active_tasks,
            active_vms: m.active_vms,
            gpus: m.gpus,
            mips: m.mips,
        }
    }

    fn vm_info(&self, id: VmId) -> VmSnapshot {
        let vm = &self.vms[id.0 as usize];
        VmSnapshot {
            id,
            guest: vm.guest,
            machine: vm.machine,
            active_tasks: vm.tasks.len() as u32,
        }
    }

    fn task_info(&self, id: TaskId) -> TaskSnapshot {
        self.tasks[&id].snapshot.clone()
    }

    fn is_task_completed(&self, id: TaskId) -> bool {
        self.tasks[&id].completed
    }

    fn set_machine_state(&mut self, id: MachineId, state: SState) {
        self.machines[id.0 as usize].requested_state = Some(state);
        self.ctx
            .emit_self(StateSettled { machine_id: id }, STATE_CHANGE_DELAY);
    }

    fn set_core_performance(&mut self, id: MachineId, _core: u32, p_state: PState) {
        // core 0 broadcasts; the demo model is per-machine anyway
        self.settle_energy(id);
        self.machines[id.0 as usize].p_state = p_state;
    }

    fn create_vm(&mut self, guest: GuestOs, _cpu: CpuArch) -> VmId {
        self.vms.push(DemoVm {
            guest,
            machine: None,
            pending_dst: None,
            tasks: Vec::new(),
        });
        VmId(self.vms.len() as u32 - 1)
    }

    fn attach_vm(&mut self, vm: VmId, machine: MachineId) {
        self.vms[vm.0 as usize].machine = Some(machine);
        let record = &mut self.machines[machine.0 as usize];
        record.active_vms += 1;
        record.memory_used += self.vm_overhead;
    }

    fn add_task(&mut self, vm: VmId, task_id: TaskId, _priority: u32) {
        let now = self.ctx.time();
        let snapshot = self.tasks[&task_id].snapshot.clone();
        self.vms[vm.0 as usize].tasks.push(task_id);

        let machine = self.vms[vm.0 as usize]
            .machine
            .expect("task added to a detached vm");
        self.settle_energy(machine);
        let record = &mut self.machines[machine.0 as usize];
        record.active_tasks += 1;
        record.memory_used += snapshot.required_memory;

        // completion time is fixed at admission from the current P-state
        let mips = record.mips.at(record.p_state);
        let duration = snapshot.remaining_instructions as f64 / (mips as f64 * 1e6);
        self.ctx.emit_self(TaskDone { task_id }, duration);

        let window = snapshot.target_completion - now;
        if window > 0.0 && now + duration > snapshot.target_completion {
            self.ctx
                .emit(SlaWarning { task_id }, self.scheduler_id, 0.6 * window);
        }
    }

    fn migrate_vm(&mut self, vm_id: VmId, dst: MachineId) {
        let (tasks, memory) = self.vm_footprint(vm_id);
        if let Some(src) = self.vms[vm_id.0 as usize].machine.take() {
            self.settle_energy(src);
            let machine = &mut self.machines[src.0 as usize];
            machine.active_vms -= 1;
            machine.active_tasks -= tasks;
            machine.memory_used -= memory;
        }
        self.vms[vm_id.0 as usize].pending_dst = Some(dst);
        self.ctx
            .emit_self(MigrationSettled { vm_id }, MIGRATION_DELAY);
    }

    fn shutdown_vm(&mut self, _vm: VmId) {
        self.shutdown_vms += 1;
    }

    fn sla_report(&self, class: SlaClass) -> f64 {
        let total = self.sla_totals[class as usize];
        if total == 0 {
            return 0.0;
        }
        100.0 * self.sla_late[class as usize] as f64 / total as f64
    }

    fn cluster_energy(&self) -> f64 {
        let now = self.ctx.time();
        let watt_seconds: f64 = self
            .machines
            .iter()
            .map(|m| m.watt_seconds + m.power_draw() * (now - m.last_energy_update))
            .sum();
        watt_seconds / 3.6e6
    }
}

impl EventHandler for FleetHost {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            TaskDone { task_id } => {
                self.on_task_done(task_id);
            }
            StateSettled { machine_id } => {
                self.on_state_settled(machine_id);
            }
            MigrationSettled { vm_id } => {
                self.on_migration_settled(vm_id);
            }
            PeriodicTick {} => {
                self.on_periodic_tick();
            }
        })
    }
}
