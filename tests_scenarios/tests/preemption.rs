//! Shortest-remaining-time preemption across real units

use core_types::{Instruction, Pid};
use sim_kernel::test_utils::wait_until;
use sim_kernel::{KernelSettings, ProcessLocation, SchedulingPolicy};
use sim_logger::MemoryLog;
use tests_scenarios::{capture_logs, fast_kernel_settings, Cluster, SCENARIO_TIMEOUT};

const INITIAL_ESTIMATE_MS: u64 = 10_000;

fn preempted_remaining(log: &MemoryLog, pid: Pid) -> Option<u64> {
    let prefix = format!("[STS] {} preempted, ", pid);
    log.entries().iter().find_map(|entry| {
        entry
            .message
            .strip_prefix(&prefix)?
            .strip_suffix("ms estimated remaining")?
            .parse()
            .ok()
    })
}

#[test]
fn test_io_return_preempts_long_slice_on_cpu() {
    let log = capture_logs();
    let cluster = Cluster::start(KernelSettings {
        first_pid: 40,
        policy: SchedulingPolicy::Srt,
        initial_estimation_ms: INITIAL_ESTIMATE_MS,
        ..fast_kernel_settings()
    });

    // A short burst before I/O halves the estimate of this process
    let short = cluster
        .kernel
        .submit(64, vec![Instruction::Io { duration_ms: 150 }, Instruction::Exit])
        .unwrap();
    assert!(wait_until(SCENARIO_TIMEOUT, || {
        cluster.kernel.location(short) == Some(ProcessLocation::Blocked)
    }));

    // The long process is on the CPU when the short one leaves I/O
    let mut program = vec![Instruction::NoOp; 400];
    program.push(Instruction::Exit);
    let long = cluster.kernel.submit(64, program).unwrap();

    assert!(cluster.kernel.wait_terminated(2, SCENARIO_TIMEOUT));
    assert_eq!(cluster.kernel.terminated(), vec![short, long]);

    // The interrupt crossed the wire and the CPU handed the PCB back Ready
    assert!(log.contains("[CPU] Interrupt received"));
    assert!(log.contains(&format!("Interruption received; returning {}", long)));
    assert!(log.contains(&format!("{} (estimate", short)));

    // The preempted slice is charged against its estimate
    let remaining = preempted_remaining(log, long).expect("long process was preempted");
    assert!(remaining < INITIAL_ESTIMATE_MS);
    assert!(remaining > INITIAL_ESTIMATE_MS / 2);

    assert_eq!(cluster.memory.with_paging(|paging| paging.process_count()), 0);
    cluster.shutdown();
}
