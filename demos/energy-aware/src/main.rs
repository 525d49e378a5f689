mod host;
mod workload;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use env_logger::Builder;
use sugars::{rc, refcell};

use dslab_core::Simulation;
use sla_scheduling::events::NewTask;
use sla_scheduling::host::{CpuArch, Host};
use sla_scheduling::{SchedulerConfig, SlaAwareScheduler};

use host::FleetHost;

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let mut sim = Simulation::new(42);

    let fleet_ctx = sim.create_context("fleet");
    let fleet = rc!(refcell!(FleetHost::new(fleet_ctx, 8)));
    sim.add_handler("fleet", fleet.clone());
    {
        let mut f = fleet.borrow_mut();
        for i in 0..6 {
            f.add_machine(CpuArch::X86, 8, 16384, i % 3 == 0, [3000, 2400, 1800, 1200]);
        }
        for _ in 0..3 {
            f.add_machine(CpuArch::Power, 16, 32768, false, [4000, 3200, 2400, 1600]);
        }
        for _ in 0..3 {
            f.add_machine(CpuArch::Arm, 4, 8192, false, [1500, 1200, 900, 600]);
        }
    }

    let scheduler_ctx = sim.create_context("scheduler");
    let as_host: Rc<RefCell<dyn Host>> = fleet.clone();
    let scheduler = rc!(refcell!(SlaAwareScheduler::new(
        SchedulerConfig::default(),
        as_host,
        scheduler_ctx
    )));
    sim.add_handler("scheduler", scheduler.clone());
    let scheduler_id = scheduler.borrow().id();
    fleet.borrow_mut().set_scheduler(scheduler_id);

    scheduler.borrow_mut().bootstrap();

    let driver = sim.create_context("workload");
    for task in workload::generate(&driver, 200) {
        let arrival = task.arrival;
        let task_id = task.id;
        fleet.borrow_mut().submit(task);
        driver.emit(NewTask { task_id }, scheduler_id, arrival);
    }
    fleet.borrow_mut().start();

    sim.step_until_no_events();

    println!("Processed {} events", sim.event_count());
}
