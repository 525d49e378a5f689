//! Startup and on-demand fleet provisioning.

use dslab_core::{log_debug, log_warn, SimulationContext};
use rustc_hash::FxHashMap;

use crate::config::SchedulerConfig;
use crate::host::{CpuArch, GuestOs, Host, MachineId, SState, VmId};
use crate::inventory::FleetInventory;

/// Guest booted on a freshly powered machine of the given architecture.
/// Architectures without a mapping cannot be provisioned at startup and their
/// group is skipped.
pub fn default_guest(cpu: CpuArch) -> Option<GuestOs> {
    match cpu {
        CpuArch::X86 => Some(GuestOs::Linux),
        CpuArch::Power => Some(GuestOs::Aix),
        CpuArch::Arm => Some(GuestOs::Win),
        CpuArch::Riscv => None,
    }
}

pub struct Provisioner;

impl Provisioner {
    /// Init protocol: enumerate the fleet, partition it by CPU architecture,
    /// power on an equal share of the machine budget per group with one
    /// default-guest VM each, and park everything else in S5.
    ///
    /// The host reports the initial fleet as powered, so the S0 sets issued
    /// here are confirmations and do not go through the transition exclusion;
    /// the S5 parks do.
    pub fn bootstrap(
        &self,
        config: &SchedulerConfig,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        ctx: &SimulationContext,
    ) {
        let mut groups: FxHashMap<CpuArch, Vec<MachineId>> = FxHashMap::default();
        for i in 0..host.machine_count() {
            let machine = MachineId(i as u32);
            let info = host.machine_info(machine);
            inventory.register_machine(info.cpu, machine);
            groups.entry(info.cpu).or_default().push(machine);
        }
        if groups.is_empty() {
            log_warn!(ctx, "bootstrap over an empty fleet");
            return;
        }

        let quota = config.active_machine_budget / groups.len();
        for (cpu, members) in &groups {
            let Some(guest) = default_guest(*cpu) else {
                log_warn!(
                    ctx,
                    "no default guest for {:?}, parking its {} machines",
                    cpu,
                    members.len()
                );
                for &machine in members {
                    self.park(host, inventory, machine);
                }
                continue;
            };

            let powered = members.len().min(quota);
            for &machine in &members[..powered] {
                host.set_machine_state(machine, SState::S0);
                let vm = self.attach_fresh_vm(host, inventory, machine, guest, *cpu);
                log_debug!(
                    ctx,
                    "machine {} powered with {:?} vm {}",
                    machine,
                    guest,
                    vm
                );
            }
            for &machine in &members[powered..] {
                self.park(host, inventory, machine);
            }
        }
    }

    /// Creates a VM of the required guest type on an already-active machine.
    pub fn vm_on_active(
        &self,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        machine: MachineId,
        guest: GuestOs,
        cpu: CpuArch,
    ) -> VmId {
        self.attach_fresh_vm(host, inventory, machine, guest, cpu)
    }

    /// Wakes a dormant machine and provisions a VM of the required guest type
    /// on it. The machine stays excluded from selection until the host
    /// acknowledges the transition.
    pub fn wake(
        &self,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        machine: MachineId,
        guest: GuestOs,
        cpu: CpuArch,
    ) -> VmId {
        host.set_machine_state(machine, SState::S0);
        inventory.begin_transition(machine, SState::S0);
        self.attach_fresh_vm(host, inventory, machine, guest, cpu)
    }

    fn attach_fresh_vm(
        &self,
        host: &mut dyn Host,
        inventory: &mut FleetInventory,
        machine: MachineId,
        guest: GuestOs,
        cpu: CpuArch,
    ) -> VmId {
        let vm = host.create_vm(guest, cpu);
        host.attach_vm(vm, machine);
        inventory.register_vm(vm);
        vm
    }

    fn park(&self, host: &mut dyn Host, inventory: &mut FleetInventory, machine: MachineId) {
        host.set_machine_state(machine, SState::S5);
        inventory.begin_transition(machine, SState::S5);
    }
}
