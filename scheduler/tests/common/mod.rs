#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use dslab_core::{Id, Simulation, SimulationContext};
use sugars::{rc, refcell};

use sla_scheduling::config::SchedulerConfig;
use sla_scheduling::host::{
    CpuArch, GuestOs, Host, MachineId, MachineSnapshot, PState, PerfProfile, SState, SlaClass,
    TaskId, TaskSnapshot, VmId, VmSnapshot,
};
use sla_scheduling::SlaAwareScheduler;

pub const DEFAULT_MIPS: [u64; 4] = [2000, 1500, 1000, 500];

pub struct FakeMachine {
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
    pub requested_state: Option<SState>,
}

pub struct FakeVm {
    pub guest: GuestOs,
    pub cpu: CpuArch,
    pub machine: Option<MachineId>,
    pub pending_dst: Option<MachineId>,
    pub tasks: Vec<TaskId>,
}

/// In-memory host double. Queries read the tables below; commands are recorded
/// and, where the real host acks asynchronously, applied only when the test
/// calls the matching `settle_*` helper.
pub struct FakeHost {
    pub machines: Vec<FakeMachine>,
    pub vms: Vec<FakeVm>,
    pub tasks: HashMap<TaskId, TaskSnapshot>,
    pub completed: HashSet<TaskId>,
    pub vm_overhead: u64,

    pub state_requests: Vec<(MachineId, SState)>,
    pub perf_requests: Vec<(MachineId, u32, PState)>,
    pub task_adds: Vec<(VmId, TaskId, u32)>,
    pub migrations: Vec<(VmId, MachineId)>,
    pub shutdowns: Vec<VmId>,

    pub energy: f64,
    pub sla: [f64; 4],
}

impl FakeHost {
    pub fn new(vm_overhead: u64) -> Self {
        FakeHost {
            machines: Vec::new(),
            vms: Vec::new(),
            tasks: HashMap::new(),
            completed: HashSet::new(),
            vm_overhead,
            state_requests: Vec::new(),
            perf_requests: Vec::new(),
            task_adds: Vec::new(),
            migrations: Vec::new(),
            shutdowns: Vec::new(),
            energy: 0.0,
            sla: [0.0; 4],
        }
    }

    pub fn add_machine(
        &mut self,
        cpu: CpuArch,
        num_cores: u32,
        memory_capacity: u64,
        gpus: bool,
        mips: [u64; 4],
    ) -> MachineId {
        self.machines.push(FakeMachine {
            cpu,
            s_state: SState::S0,
            p_state: PState::P0,
            memory_capacity,
            memory_used: 0,
            num_cores,
            active_tasks: 0,
            active_vms: 0,
            gpus,
            mips: PerfProfile(mips),
            requested_state: None,
        });
        MachineId(self.machines.len() as u32 - 1)
    }

    pub fn submit(&mut self, task: TaskSnapshot) {
        self.tasks.insert(task.id, task);
    }

    /// Applies the last requested S-state, as the real host would right before
    /// sending `StateChangeComplete`.
    pub fn settle_machine(&mut self, machine: MachineId) {
        let record = &mut self.machines[machine.0 as usize];
        if let Some(state) = record.requested_state.take() {
            record.s_state = state;
        }
    }

    /// Lands a detached migrating VM on its destination.
    pub fn settle_migration(&mut self, vm_id: VmId) {
        let vm_memory = self.vm_tasks_memory(vm_id);
        let vm = &mut self.vms[vm_id.0 as usize];
        let dst = vm.pending_dst.take().expect("vm is not migrating");
        vm.machine = Some(dst);
        let tasks = vm.tasks.len() as u32;
        let machine = &mut self.machines[dst.0 as usize];
        machine.active_vms += 1;
        machine.active_tasks += tasks;
        machine.memory_used += self.vm_overhead + vm_memory;
    }

    pub fn complete_task(&mut self, task_id: TaskId) {
        self.completed.insert(task_id);
        let memory = self.tasks[&task_id].required_memory;
        for vm in &mut self.vms {
            if let Some(pos) = vm.tasks.iter().position(|&t| t == task_id) {
                vm.tasks.remove(pos);
                if let Some(machine) = vm.machine {
                    let record = &mut self.machines[machine.0 as usize];
                    record.active_tasks -= 1;
                    record.memory_used -= memory;
                }
                return;
            }
        }
    }

    fn vm_tasks_memory(&self, vm_id: VmId) -> u64 {
        self.vms[vm_id.0 as usize]
            .tasks
            .iter()
            .map(|t| self.tasks[t].required_memory)
            .sum()
    }
}

impl Host for FakeHost {
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
        self.tasks[&id].clone()
    }

    fn is_task_completed(&self, id: TaskId) -> bool {
        self.completed.contains(&id)
    }

    fn set_machine_state(&mut self, id: MachineId, state: SState) {
        self.state_requests.push((id, state));
        self.machines[id.0 as usize].requested_state = Some(state);
    }

    fn set_core_performance(&mut self, id: MachineId, core: u32, p_state: PState) {
        self.perf_requests.push((id, core, p_state));
        self.machines[id.0 as usize].p_state = p_state;
    }

    fn create_vm(&mut self, guest: GuestOs, cpu: CpuArch) -> VmId {
        self.vms.push(FakeVm {
            guest,
            cpu,
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

    fn add_task(&mut self, vm: VmId, task: TaskId, priority: u32) {
        self.task_adds.push((vm, task, priority));
        let memory = self.tasks[&task].required_memory;
        self.vms[vm.0 as usize].tasks.push(task);
        if let Some(machine) = self.vms[vm.0 as usize].machine {
            let record = &mut self.machines[machine.0 as usize];
            record.active_tasks += 1;
            record.memory_used += memory;
        }
    }

    fn migrate_vm(&mut self, vm_id: VmId, dst: MachineId) {
        self.migrations.push((vm_id, dst));
        let vm_memory = self.vm_tasks_memory(vm_id);
        let vm = &mut self.vms[vm_id.0 as usize];
        let tasks = vm.tasks.len() as u32;
        if let Some(src) = vm.machine.take() {
            let record = &mut self.machines[src.0 as usize];
            record.active_vms -= 1;
            record.active_tasks -= tasks;
            record.memory_used -= self.vm_overhead + vm_memory;
        }
        vm.pending_dst = Some(dst);
    }

    fn shutdown_vm(&mut self, vm: VmId) {
        self.shutdowns.push(vm);
    }

    fn sla_report(&self, class: SlaClass) -> f64 {
        self.sla[class as usize]
    }

    fn cluster_energy(&self) -> f64 {
        self.energy
    }
}

pub struct TestBed {
    pub sim: Simulation,
    pub host: Rc<RefCell<FakeHost>>,
    pub scheduler: Rc<RefCell<SlaAwareScheduler>>,
    pub scheduler_id: Id,
    pub driver: SimulationContext,
}

pub fn testbed(config: SchedulerConfig, fake: FakeHost) -> TestBed {
    let mut sim = Simulation::new(42);
    let host = rc!(refcell!(fake));
    let ctx = sim.create_context("scheduler");
    let as_host: Rc<RefCell<dyn Host>> = host.clone();
    let scheduler = rc!(refcell!(SlaAwareScheduler::new(config, as_host, ctx)));
    sim.add_handler("scheduler", scheduler.clone());
    let scheduler_id = scheduler.borrow().id();
    let driver = sim.create_context("driver");
    TestBed {
        sim,
        host,
        scheduler,
        scheduler_id,
        driver,
    }
}

impl TestBed {
    pub fn bootstrap(&mut self) {
        self.scheduler.borrow_mut().bootstrap();
    }

    pub fn run(&mut self) {
        self.sim.step_until_no_events();
    }
}

pub fn task(
    id: u64,
    cpu: CpuArch,
    guest: GuestOs,
    memory: u64,
    sla: SlaClass,
    target_completion: f64,
    remaining_instructions: u64,
    gpu_capable: bool,
) -> TaskSnapshot {
    TaskSnapshot {
        id: TaskId(id),
        required_cpu: cpu,
        required_guest: guest,
        required_memory: memory,
        priority: 1,
        sla,
        arrival: 0.0,
        target_completion,
        remaining_instructions,
        gpu_capable,
    }
}
