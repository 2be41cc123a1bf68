//! Frame quota enforcement across real units

use core_types::Instruction;
use sim_kernel::KernelSettings;
use tests_scenarios::{capture_logs, fast_kernel_settings, Cluster, SCENARIO_TIMEOUT};

#[test]
fn test_quota_overflow_terminates_through_cpu() {
    let log = capture_logs();
    let cluster = Cluster::start(KernelSettings {
        first_pid: 60,
        ..fast_kernel_settings()
    });

    // Five distinct 64-byte pages against a quota of four frames
    let mut greedy_program: Vec<Instruction> = (0..5)
        .map(|page| Instruction::Write {
            address: page * 64,
            value: 100 + page,
        })
        .collect();
    greedy_program.push(Instruction::Exit);
    let greedy = cluster.kernel.submit(512, greedy_program).unwrap();

    let modest = cluster
        .kernel
        .submit(
            256,
            vec![
                Instruction::Write {
                    address: 8,
                    value: 7,
                },
                Instruction::Exit,
            ],
        )
        .unwrap();

    assert!(cluster.kernel.wait_terminated(2, SCENARIO_TIMEOUT));
    let terminated = cluster.kernel.terminated();
    assert!(terminated.contains(&greedy) && terminated.contains(&modest));

    assert!(log.contains("Page replacement is required"));
    assert!(log.contains(&format!("[CPU] {} terminated", greedy)));
    assert!(log.contains("Value 103 was written"));
    assert!(!log.contains("Value 104 was written"));
    assert!(log.contains("Value 7 was written"));

    // Every frame the overflowing process held went back to the pool
    assert_eq!(cluster.memory.table_of(greedy), None);
    assert_eq!(cluster.memory.with_paging(|paging| paging.process_count()), 0);
    cluster.shutdown();
}
