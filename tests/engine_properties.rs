use hospital_sim::engine::{run_simulation, run_simulation_with_options, RunOptions, SimulationEngine};
use hospital_sim::models::{OperationExit, SimConfig};
use hospital_sim::random::ExponentialStreams;
use hospital_sim::stage::{Stage, StageKind};
use hospital_sim::state::StopReason;

fn example_config(seed: u64) -> SimConfig {
    SimConfig {
        seed,
        ..SimConfig::default()
    }
}

#[test]
fn example_configuration_is_reproducible_and_bounded() {
    let first = run_simulation(&example_config(2024)).expect("run should succeed");
    let second = run_simulation(&example_config(2024)).expect("run should succeed");

    assert_eq!(first.metadata.stop_reason, StopReason::Horizon);
    assert_eq!(first.metadata.end_time, 1000.0);
    assert_eq!(first.patients.arrived, second.patients.arrived);
    assert_eq!(first.departures, second.departures);

    for (left, right) in first.stages.iter().zip(&second.stages) {
        assert_eq!(left.avg_queue_length, right.avg_queue_length);
        assert_eq!(left.utilization, right.utilization);
        assert!(left.utilization >= 0.0 && left.utilization <= 1.0);
        assert!(left.blocked_fraction >= 0.0 && left.blocked_fraction <= left.utilization);
        assert!(left.avg_queue_length >= 0.0);
    }
    assert_eq!(first.stage(StageKind::Preparation).blocked_fraction, 0.0);
    assert_eq!(first.stage(StageKind::Recovery).blocked_fraction, 0.0);
    assert_eq!(
        first.patients.arrived,
        first.patients.departed + first.patients.in_system
    );
}

#[test]
fn example_configuration_matches_recorded_fixture() {
    let result = run_simulation(&example_config(2024)).expect("run should succeed");
    let expected = [
        (StageKind::Preparation, 0.01917434438822306, 0.43898125789398273),
        (StageKind::Operation, 0.429414995876686, 0.6194263373503488),
        (StageKind::Recovery, 0.0, 0.5371031890642992),
    ];

    for (kind, queue, utilization) in expected {
        let stage = result.stage(kind);
        assert!(
            (stage.avg_queue_length - queue).abs() < 1e-12,
            "{} avg queue {}",
            kind,
            stage.avg_queue_length
        );
        assert!(
            (stage.utilization - utilization).abs() < 1e-12,
            "{} utilization {}",
            kind,
            stage.utilization
        );
    }
}

#[test]
fn heavily_loaded_theater_stays_busy() {
    let config = SimConfig {
        simulation_time: 100_000.0,
        warm_up: 1_000.0,
        seed: 17,
        ..SimConfig::default()
    };
    let result = run_simulation_with_options(
        &config,
        RunOptions {
            store_patients: false,
            ..RunOptions::default()
        },
    )
    .expect("run should succeed");

    let operation = result.stage(StageKind::Operation);
    assert!(
        operation.utilization > 0.7 && operation.utilization <= 1.0,
        "operation utilization {}",
        operation.utilization
    );
    assert!(result.departures.is_empty());
    assert!(result.avg_time_in_system.is_some());
}

#[test]
fn recovery_durations_do_not_disturb_upstream_streams() {
    let options = RunOptions {
        record_series: true,
        ..RunOptions::default()
    };
    let base = SimConfig {
        simulation_time: 2_000.0,
        seed: 99,
        ..SimConfig::default()
    };
    let slower_recovery = SimConfig {
        recovery_time: 90.0,
        ..base.clone()
    };

    let a = run_simulation_with_options(&base, options).expect("run should succeed");
    let b = run_simulation_with_options(&slower_recovery, options).expect("run should succeed");

    assert_eq!(a.patients.arrived, b.patients.arrived);
    assert_eq!(a.series[0].stage, StageKind::Preparation);
    assert_eq!(a.series[0].samples, b.series[0].samples);
    assert_eq!(
        a.stage(StageKind::Preparation).admissions,
        b.stage(StageKind::Preparation).admissions
    );
}

#[test]
fn release_policy_never_blocks() {
    for seed in 0..5 {
        let config = SimConfig {
            operation_exit: OperationExit::Release,
            recovery_units: 1,
            seed,
            ..SimConfig::default()
        };
        let result = run_simulation(&config).expect("run should succeed");
        let operation = result.stage(StageKind::Operation);
        assert_eq!(operation.avg_blocked, 0.0);
        assert!(result.departures.iter().all(|record| record.blocked_for == 0.0));
    }
}

#[test]
fn every_patient_is_somewhere_at_every_event() {
    let config = SimConfig {
        recovery_units: 1,
        simulation_time: 3_000.0,
        seed: 5,
        ..SimConfig::default()
    };
    let source = ExponentialStreams::from_config(&config).expect("valid means");
    let mut engine = SimulationEngine::new(config, Box::new(source), RunOptions::default())
        .expect("engine should build");

    while engine.step().expect("step should succeed") {
        let held: u64 = StageKind::ALL
            .into_iter()
            .map(|kind| {
                let stage = engine.stage(kind);
                u64::from(stage.busy_count()) + stage.queue_length() as u64
            })
            .sum();
        assert_eq!(engine.in_system(), held);
        assert_eq!(engine.arrived(), engine.departed() + engine.in_system());
        assert_eq!(
            engine.stage(StageKind::Operation).blocked_count() as usize,
            engine.blocked().count()
        );
    }

    let result = engine.finish().expect("finish should succeed");
    assert_eq!(result.metadata.stop_reason, StopReason::Horizon);
    for record in &result.departures {
        assert!(record.departed <= 3_000.0);
        let mut sojourns = 0.0;
        for kind in StageKind::ALL {
            let times = record.stage(kind);
            let (entered, started, exited) = (
                times.entered.expect("entered"),
                times.started.expect("started"),
                times.exited.expect("exited"),
            );
            assert!(entered <= started && started <= exited);
            sojourns += exited - entered;
        }
        let total = sojourns + record.blocked_for;
        assert!((record.time_in_system() - total).abs() < 1e-6);
    }
}

#[test]
fn warm_up_shrinks_the_observation_window() {
    let config = SimConfig {
        warm_up: 400.0,
        seed: 8,
        ..SimConfig::default()
    };
    let result = run_simulation(&config).expect("run should succeed");
    assert_eq!(result.metadata.warm_up, 400.0);
    for stage in &result.stages {
        assert!(stage.avg_busy <= f64::from(stage.capacity));
    }
}
