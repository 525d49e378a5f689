//! Random workload over a heterogeneous fleet.

use dslab_core::SimulationContext;
use rand_distr::Normal;

use sla_scheduling::host::{CpuArch, GuestOs, SlaClass, TaskId, TaskSnapshot};

pub fn generate(ctx: &SimulationContext, count: u64) -> Vec<TaskSnapshot> {
    let mut tasks = Vec::with_capacity(count as usize);
    let instructions = Normal::new(4e9, 1.5e9).unwrap();

    let mut time = 1.0;
    for id in 0..count {
        let required_cpu = match ctx.gen_range(0..10) {
            0..=5 => CpuArch::X86,
            6..=8 => CpuArch::Power,
            _ => CpuArch::Arm,
        };
        let required_guest = match required_cpu {
            CpuArch::X86 => {
                if ctx.gen_range(0..4) == 0 {
                    GuestOs::LinuxRt
                } else {
                    GuestOs::Linux
                }
            }
            CpuArch::Power => GuestOs::Aix,
            CpuArch::Arm => GuestOs::Win,
            CpuArch::Riscv => unreachable!(),
        };
        let sla = match ctx.gen_range(0..4) {
            0 => SlaClass::Sla0,
            1 => SlaClass::Sla1,
            2 => SlaClass::Sla2,
            _ => SlaClass::Sla3,
        };
        let remaining_instructions = ctx.sample_from_distribution(&instructions).max(5e8) as u64;
        // deadline slack relative to a mid-fleet execution speed
        let nominal = remaining_instructions as f64 / 1.5e9;
        let target_completion = time + nominal * ctx.gen_range(1.2..3.0);

        tasks.push(TaskSnapshot {
            id: TaskId(id),
            required_cpu,
            required_guest,
            required_memory: ctx.gen_range(256..4096),
            priority: match sla {
                SlaClass::Sla0 => 3,
                SlaClass::Sla1 => 2,
                _ => 1,
            },
            sla,
            arrival: time,
            target_completion,
            remaining_instructions,
            gpu_capable: ctx.gen_range(0..5) == 0,
        });

        time += ctx.gen_range(0.1..2.0);
    }
    tasks
}
