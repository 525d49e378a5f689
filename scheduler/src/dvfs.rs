//! Utilization-driven P-state control and idle consolidation.

use dslab_core::{log_debug, SimulationContext};

use crate::config::SchedulerConfig;
use crate::host::{Host, PState, SState};
use crate::inventory::FleetInventory;

pub const HIGH_UTILIZATION: f64 = 0.80;
pub const MID_UTILIZATION: f64 = 0.50;
pub const LOW_UTILIZATION: f64 = 0.20;

/// DVFS table: deeper throttle the lower the utilization.
pub fn p_state_for_utilization(utilization: f64) -> PState {
    if utilization > HIGH_UTILIZATION {
        PState::P0
    } else if utilization > MID_UTILIZATION {
        PState::P1
    } else if utilization > LOW_UTILIZATION {
        PState::P2
    } else {
        PState::P3
    }
}

pub struct DvfsController;

impl DvfsController {
    /// Periodic pass: retarget every active machine's P-state from its
    /// observed utilization, and optionally send empty machines to S5.
    ///
    /// The target is re-issued even when unchanged; `core = 0` broadcasts per
    /// the host contract.
    pub fn tick(
        &self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        ctx: &SimulationContext,
    ) {
        let machines = inventory.machines().to_vec();
        for machine in machines {
            if inventory.in_transition(machine) {
                continue;
            }
            let info = host.machine_info(machine);
            if info.s_state != SState::S0 {
                continue;
            }

            let utilization = info.active_tasks as f64 / info.num_cores as f64;
            host.set_core_performance(machine, 0, p_state_for_utilization(utilization));

            if config.consolidate_idle && info.active_tasks == 0 && info.active_vms == 0 {
                log_debug!(ctx, "consolidating idle machine {}", machine);
                host.set_machine_state(machine, SState::S5);
                inventory.begin_transition(machine, SState::S5);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_boundaries_are_strict() {
        assert_eq!(p_state_for_utilization(1.0), PState::P0);
        assert_eq!(p_state_for_utilization(0.81), PState::P0);
        assert_eq!(p_state_for_utilization(0.80), PState::P1);
        assert_eq!(p_state_for_utilization(0.75), PState::P1);
        assert_eq!(p_state_for_utilization(0.50), PState::P2);
        assert_eq!(p_state_for_utilization(0.21), PState::P2);
        assert_eq!(p_state_for_utilization(0.20), PState::P3);
        assert_eq!(p_state_for_utilization(0.0), PState::P3);
    }
}
