//! Full runs across Kernel, CPU and Memory over loopback TCP

use core_types::{Instruction, Pid};
use sim_kernel::KernelSettings;
use tests_scenarios::{capture_logs, fast_kernel_settings, Cluster, SCENARIO_TIMEOUT};

#[test]
fn test_write_then_exit_releases_everything() {
    let log = capture_logs();
    let cluster = Cluster::start(KernelSettings {
        first_pid: 7,
        ..fast_kernel_settings()
    });

    let pid = cluster
        .kernel
        .submit(
            256,
            vec![
                Instruction::Write {
                    address: 100,
                    value: 42,
                },
                Instruction::Exit,
            ],
        )
        .unwrap();
    assert_eq!(pid, Pid::new(7));

    assert!(cluster.kernel.wait_terminated(1, SCENARIO_TIMEOUT));
    assert_eq!(cluster.kernel.terminated(), vec![Pid::new(7)]);

    // Memory acknowledged PROCESS_TERMINATED before the pid was recorded
    assert_eq!(cluster.memory.table_of(pid), None);
    assert!(!cluster.swap_dir().join("7.swap").exists());
    assert_eq!(cluster.memory.with_paging(|paging| paging.process_count()), 0);
    assert!(log.contains("Value 42 was written"));

    assert!(cluster.kernel.is_idle());
    cluster.shutdown();
}

#[test]
fn test_several_programs_run_to_completion() {
    let cluster = Cluster::start(fast_kernel_settings());

    let programs = vec![
        vec![Instruction::NoOp, Instruction::NoOp, Instruction::Exit],
        vec![
            Instruction::Write {
                address: 4,
                value: 9,
            },
            Instruction::Copy {
                destination: 200,
                source: 4,
            },
            Instruction::Read { address: 200 },
            Instruction::Exit,
        ],
        vec![Instruction::Io { duration_ms: 20 }, Instruction::Exit],
        // Segmentation fault: address beyond the declared size
        vec![Instruction::Read { address: 512 }, Instruction::Exit],
    ];
    let mut submitted: Vec<Pid> = programs
        .into_iter()
        .map(|program| cluster.kernel.submit(256, program).unwrap())
        .collect();

    assert!(cluster.kernel.wait_terminated(submitted.len(), SCENARIO_TIMEOUT));
    let mut terminated = cluster.kernel.terminated();
    terminated.sort();
    submitted.sort();
    assert_eq!(terminated, submitted);
    assert_eq!(cluster.memory.with_paging(|paging| paging.process_count()), 0);
    cluster.shutdown();
}
