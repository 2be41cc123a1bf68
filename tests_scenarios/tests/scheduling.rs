//! Admission and ordering through the public Kernel API

use core_types::{Instruction, Pid, ProcessControlBlock};
use sim_kernel::test_utils::{serve_in_memory, wait_until, RecordingMemory, ScriptedCpu};
use sim_kernel::{
    Kernel, KernelLinks, KernelSettings, ProcessLocation, ReadyPolicy, SchedulingPolicy,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tests_scenarios::{fast_kernel_settings, SCENARIO_TIMEOUT};

fn kernel_with_cpu(settings: KernelSettings, cpu: Arc<ScriptedCpu>) -> Arc<Kernel> {
    let (dispatch, _) = serve_in_memory(cpu);
    let (memory, _) = serve_in_memory(Arc::new(RecordingMemory::default()));
    Kernel::new(
        settings,
        KernelLinks {
            memory: Some(memory),
            dispatch,
            interrupt: None,
        },
    )
}

#[test]
fn test_degree_of_multiprogramming_bounds_admission() {
    let (cpu, gate) = ScriptedCpu::exiting().gated();
    let cpu = Arc::new(cpu);
    let kernel = kernel_with_cpu(fast_kernel_settings(), cpu.clone());
    kernel.start().unwrap();

    let pids: Vec<Pid> = (0..3)
        .map(|_| kernel.submit(64, vec![Instruction::Exit]).unwrap())
        .collect();

    // Two slots: one process on the CPU, one Ready, the third waits in New
    assert!(wait_until(SCENARIO_TIMEOUT, || {
        kernel.snapshot().admitted() == 2 && cpu.dispatched().len() == 1
    }));
    assert_eq!(kernel.location(pids[2]), Some(ProcessLocation::New));
    assert_eq!(kernel.snapshot().free_slots, 0);

    // Finishing the first slice frees a slot for the third process
    gate.send(()).unwrap();
    assert!(kernel.wait_terminated(1, SCENARIO_TIMEOUT));
    assert!(wait_until(SCENARIO_TIMEOUT, || {
        kernel.location(pids[2]) != Some(ProcessLocation::New)
    }));
    assert!(kernel.snapshot().admitted() <= 2);

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    assert!(kernel.wait_terminated(3, SCENARIO_TIMEOUT));
    assert_eq!(cpu.dispatched(), pids);
    assert_eq!(kernel.snapshot().free_slots, 2);

    drop(gate);
    kernel.shutdown();
}

#[test]
fn test_fifo_dispatches_in_arrival_order() {
    let cpu = Arc::new(ScriptedCpu::exiting());
    let settings = KernelSettings {
        degree_of_multiprogramming: 1,
        policy: SchedulingPolicy::Fifo,
        ..fast_kernel_settings()
    };
    let kernel = kernel_with_cpu(settings, cpu.clone());

    let pids: Vec<Pid> = (0..4)
        .map(|_| kernel.submit(64, vec![Instruction::NoOp, Instruction::Exit]).unwrap())
        .collect();
    kernel.start().unwrap();

    assert!(kernel.wait_terminated(pids.len(), SCENARIO_TIMEOUT));
    assert_eq!(cpu.dispatched(), pids);
    assert_eq!(kernel.terminated(), pids);
    kernel.shutdown();
}

#[test]
fn test_srt_selection_keeps_arrival_order_on_ties() {
    let mut ready: VecDeque<ProcessControlBlock> = [(1, 5), (2, 5), (3, 3)]
        .into_iter()
        .map(|(pid, estimation)| {
            ProcessControlBlock::new(Pid::new(pid), 64, vec![Instruction::Exit], estimation)
        })
        .collect();

    let mut order = Vec::new();
    while let Some(pcb) = SchedulingPolicy::Srt.select_next(&mut ready) {
        order.push(pcb.pid.as_u32());
    }
    assert_eq!(order, vec![3, 1, 2]);
}

#[test]
fn test_fifo_selection_ignores_estimates() {
    let mut ready: VecDeque<ProcessControlBlock> = [(1, 9), (2, 1)]
        .into_iter()
        .map(|(pid, estimation)| {
            ProcessControlBlock::new(Pid::new(pid), 64, vec![Instruction::Exit], estimation)
        })
        .collect();

    assert_eq!(
        SchedulingPolicy::Fifo.select_next(&mut ready).map(|pcb| pcb.pid),
        Some(Pid::new(1))
    );
    assert!(!SchedulingPolicy::Fifo.is_preemptive());
    assert!(SchedulingPolicy::Srt.is_preemptive());
}
