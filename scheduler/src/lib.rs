#![doc = include_str!("../readme.md")]

pub mod config;
pub mod deadline;
pub mod dvfs;
pub mod events;
pub mod host;
pub mod inventory;
pub mod placement;
pub mod provisioner;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use host::{CpuArch, GuestOs, Host, MachineId, PState, SState, SlaClass, TaskId, VmId};
pub use placement::Placement;
pub use scheduler::SlaAwareScheduler;
