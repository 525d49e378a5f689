//! The scheduler core: owns the five policy components and dispatches host
//! events to them.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use dslab_core::{cast, log_debug, log_error, log_info, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::config::SchedulerConfig;
use crate::deadline::DeadlineTracker;
use crate::dvfs::DvfsController;
use crate::events::{
    MemoryWarning, MigrationDone, NewTask, SchedulerCheck, SimulationComplete, SlaWarning,
    StateChangeComplete, TaskCompleted,
};
use crate::host::{Host, MachineId, SlaClass, TaskId, VmId};
use crate::inventory::FleetInventory;
use crate::placement::{Placement, PlacementEngine};
use crate::provisioner::Provisioner;

/// SLA- and energy-aware scheduler. One instance per simulation, constructed
/// before the first event; every handler borrows it mutably under the host's
/// single-threaded dispatcher.
pub struct SlaAwareScheduler {
    config: SchedulerConfig,
    host: Rc<RefCell<dyn Host>>,

    inventory: FleetInventory,
    provisioner: Provisioner,
    placement: PlacementEngine,
    dvfs: DvfsController,
    deadlines: DeadlineTracker,

    started: Instant,
    ctx: SimulationContext,
}

impl SlaAwareScheduler {
    pub fn new(
        config: SchedulerConfig,
        host: Rc<RefCell<dyn Host>>,
        ctx: SimulationContext,
    ) -> Self {
        SlaAwareScheduler {
            config,
            host,
            inventory: FleetInventory::new(),
            provisioner: Provisioner,
            placement: PlacementEngine,
            dvfs: DvfsController,
            deadlines: DeadlineTracker::new(),
            started: Instant::now(),
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Init protocol, invoked by the host once before the first event.
    pub fn bootstrap(&mut self) {
        log_info!(
            self.ctx,
            "initializing scheduler, machine budget {}",
            self.config.active_machine_budget
        );
        self.started = Instant::now();
        let mut host = self.host.borrow_mut();
        self.provisioner
            .bootstrap(&self.config, &mut *host, &mut self.inventory, &self.ctx);
        log_info!(
            self.ctx,
            "bootstrap complete: {} machines registered, {} vms warm",
            self.inventory.machines().len(),
            self.inventory.vms().len()
        );
    }

    /// Tasks currently tracked towards their deadline.
    pub fn active_task_count(&self) -> usize {
        self.deadlines.active_count()
    }

    fn on_new_task(&mut self, task_id: TaskId) {
        let mut host = self.host.borrow_mut();
        let task = host.task_info(task_id);
        match self.placement.place(
            &self.config,
            &mut *host,
            &mut self.inventory,
            &self.provisioner,
            &task,
            &self.ctx,
        ) {
            Placement::Placed(vm) => {
                self.deadlines
                    .track(task_id, task.sla, task.target_completion, vm);
                log_debug!(self.ctx, "task {} placed on vm {}", task_id, vm);
            }
            // no record is kept; the host's next event may open capacity
            Placement::Deferred | Placement::Unplaceable => {}
        }
    }

    fn on_task_completed(&mut self, task_id: TaskId) {
        if !self.deadlines.complete(task_id) {
            log_debug!(self.ctx, "completion for untracked task {}", task_id);
        }
    }

    fn on_scheduler_check(&mut self) {
        let mut host = self.host.borrow_mut();
        self.deadlines
            .check_deadlines(&self.config, &mut *host, &self.ctx);
        self.dvfs
            .tick(&self.config, &mut *host, &mut self.inventory, &self.ctx);
    }

    fn on_sla_warning(&mut self, task_id: TaskId) {
        let mut host = self.host.borrow_mut();
        self.deadlines.on_sla_warning(
            &self.config,
            &mut *host,
            &mut self.inventory,
            task_id,
            &self.ctx,
        );
    }

    fn on_migration_done(&mut self, vm: VmId) {
        match self.inventory.mark_vm_settled(vm) {
            Some(dst) => log_debug!(self.ctx, "vm {} settled on machine {}", vm, dst),
            None => log_warn!(self.ctx, "migration ack for vm {} that was not migrating", vm),
        }
    }

    fn on_state_change_complete(&mut self, machine: MachineId) {
        match self.inventory.finish_transition(machine) {
            Some(state) => log_debug!(self.ctx, "machine {} reached {:?}", machine, state),
            // the host may change states on its own; nothing to settle
            None => log_debug!(self.ctx, "state ack for machine {} without a pending request", machine),
        }
    }

    fn on_memory_warning(&mut self, machine: MachineId) {
        log_error!(self.ctx, "memory overcommit on machine {}", machine);
    }

    fn on_simulation_complete(&mut self) {
        let mut host = self.host.borrow_mut();
        println!("SLA violation report");
        for class in SlaClass::penalized() {
            println!("{}: {}%", class, host.sla_report(class));
        }
        println!("Total Energy {} KW-Hour", host.cluster_energy());
        println!("Simulation run finished in {} seconds", self.ctx.time());
        println!(
            "Scheduler wall time: {:.3} seconds",
            self.started.elapsed().as_secs_f64()
        );
        for vm in self.inventory.drain_vms() {
            host.shutdown_vm(vm);
        }
    }
}

impl EventHandler for SlaAwareScheduler {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            NewTask { task_id } => {
                self.on_new_task(task_id);
            }
            TaskCompleted { task_id } => {
                self.on_task_completed(task_id);
            }
            SchedulerCheck {} => {
                self.on_scheduler_check();
            }
            SlaWarning { task_id } => {
                self.on_sla_warning(task_id);
            }
            MigrationDone { vm_id } => {
                self.on_migration_done(vm_id);
            }
            StateChangeComplete { machine_id } => {
                self.on_state_change_complete(machine_id);
            }
            MemoryWarning { machine_id } => {
                self.on_memory_warning(machine_id);
            }
            SimulationComplete {} => {
                self.on_simulation_complete();
            }
        })
    }
}
