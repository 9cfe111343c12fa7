use serde::Serialize;
use std::fmt::Write as _;
use std::io;

use crate::error::{Error, Result};
use crate::models::SimConfig;
use crate::replication::{Estimate, ReplicationReport};
use crate::stage::StageKind;
use crate::state::{SimulationResult, StageSummary};

pub trait Formatter {
    fn write(&self, result: &SimulationResult) -> Result<String>;
    fn write_replications(&self, report: &ReplicationReport) -> Result<String>;
}

pub struct HumanFormatter;
pub struct SummaryFormatter;
pub struct JsonFormatter;

impl Formatter for HumanFormatter {
    fn write(&self, result: &SimulationResult) -> Result<String> {
        let mut out = String::new();
        write_metadata(&mut out, result);
        if !result.departures.is_empty() {
            out.push_str("Patients:\n");
            for record in &result.departures {
                let _ = writeln!(
                    out,
                    "Patient {}: arrived {:.2}, discharged {:.2} (in system {:.2}, blocked {:.2})",
                    record.id,
                    record.arrival,
                    record.departed,
                    record.time_in_system(),
                    record.blocked_for
                );
            }
        }
        write_summary(&mut out, result);
        Ok(out)
    }

    fn write_replications(&self, report: &ReplicationReport) -> Result<String> {
        Ok(replications_text(report))
    }
}

impl Formatter for SummaryFormatter {
    fn write(&self, result: &SimulationResult) -> Result<String> {
        let mut out = String::new();
        write_metadata(&mut out, result);
        write_summary(&mut out, result);
        Ok(out)
    }

    fn write_replications(&self, report: &ReplicationReport) -> Result<String> {
        Ok(replications_text(report))
    }
}

impl Formatter for JsonFormatter {
    fn write(&self, result: &SimulationResult) -> Result<String> {
        to_json(result)
    }

    fn write_replications(&self, report: &ReplicationReport) -> Result<String> {
        to_json(report)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|err| Error::Output(format!("failed to encode JSON: {}", err)))?;
    json.push('\n');
    Ok(json)
}

fn write_metadata(out: &mut String, result: &SimulationResult) {
    let meta = &result.metadata;
    out.push_str("Metadata:\n");
    let _ = writeln!(out, "seed: {}", meta.seed);
    let _ = writeln!(out, "simulation_time: {:.2}", meta.simulation_time);
    let _ = writeln!(out, "warm_up: {:.2}", meta.warm_up);
    let _ = writeln!(out, "end_time: {:.2}", meta.end_time);
    let _ = writeln!(out, "events: {}", meta.events_processed);
    let _ = writeln!(out, "stop_reason: {}", meta.stop_reason);
}

fn write_summary(out: &mut String, result: &SimulationResult) {
    out.push_str("Summary:\n");
    let _ = writeln!(out, "arrived: {}", result.patients.arrived);
    let _ = writeln!(out, "departed: {}", result.patients.departed);
    let _ = writeln!(out, "in_system: {}", result.patients.in_system);
    match result.avg_time_in_system {
        Some(value) => {
            let _ = writeln!(out, "avg_time_in_system: {:.2}", value);
        }
        None => out.push_str("avg_time_in_system: n/a\n"),
    }
    for stage in &result.stages {
        write_stage(out, stage);
    }
}

fn write_stage(out: &mut String, stage: &StageSummary) {
    let wait = stage
        .avg_wait
        .map_or_else(|| "n/a".to_string(), |value| format!("{:.2}", value));
    let _ = writeln!(
        out,
        "{} ({} units): avg queue {:.2}, utilization {:.2}%, blocked {:.2}%, avg wait {}",
        stage.stage,
        stage.capacity,
        stage.avg_queue_length,
        stage.utilization * 100.0,
        stage.blocked_fraction * 100.0,
        wait
    );
}

fn replications_text(report: &ReplicationReport) -> String {
    let mut out = String::new();
    out.push_str("Replications:\n");
    let _ = writeln!(out, "runs: {}", report.runs);
    let _ = writeln!(out, "base_seed: {}", report.base_seed);
    for stage in &report.stages {
        let _ = writeln!(out, "{}:", stage.stage);
        write_estimate(&mut out, "avg queue", &stage.avg_queue_length, 1.0);
        write_estimate(&mut out, "utilization %", &stage.utilization, 100.0);
        write_estimate(&mut out, "blocked %", &stage.blocked_fraction, 100.0);
        match stage.serial_correlation {
            Some(value) => {
                let _ = writeln!(out, "  serial correlation (lag 1): {:.3}", value);
            }
            None => out.push_str("  serial correlation (lag 1): n/a\n"),
        }
    }
    match &report.avg_time_in_system {
        Some(estimate) => write_estimate(&mut out, "time in system", estimate, 1.0),
        None => out.push_str("  time in system: n/a\n"),
    }
    out
}

fn write_estimate(out: &mut String, label: &str, estimate: &Estimate, scale: f64) {
    let _ = writeln!(
        out,
        "  {}: mean {:.2}, sd {:.2}, 95% CI ({:.2}, {:.2})",
        label,
        estimate.mean * scale,
        estimate.std_dev * scale,
        estimate.ci_low * scale,
        estimate.ci_high * scale
    );
}

pub fn describe_config(config: &SimConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Simulation time: {}", config.simulation_time);
    let _ = writeln!(out, "Interarrival time: {}", config.interarrival_time);
    let _ = writeln!(out, "Warm-up: {}", config.warm_up);
    let _ = writeln!(out, "Seed: {}", config.seed);
    let _ = writeln!(out, "Operation exit: {}", config.operation_exit);
    let _ = writeln!(out, "Recovery precedence: {}", config.recovery_precedence);
    out.push_str("Stages:\n");
    let stages = [
        (
            StageKind::Preparation,
            config.preparation_units,
            config.preparation_time,
        ),
        (
            StageKind::Operation,
            config.operation_units,
            config.operation_time,
        ),
        (
            StageKind::Recovery,
            config.recovery_units,
            config.recovery_time,
        ),
    ];
    for (stage, units, mean) in stages {
        let _ = writeln!(out, "- {} (units: {}, mean time: {})", stage, units, mean);
    }
    out
}

#[derive(Serialize)]
struct SeriesRow {
    time: f64,
    stage: StageKind,
    queue_length: usize,
    busy_count: u32,
    blocked_count: u32,
}

/// Writes every recorded sample as `time,stage,queue_length,busy_count,blocked_count`.
pub fn write_series_csv<W: io::Write>(result: &SimulationResult, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for series in &result.series {
        for sample in &series.samples {
            wtr.serialize(SeriesRow {
                time: sample.time,
                stage: series.stage,
                queue_length: sample.queue_length,
                busy_count: sample.busy_count,
                blocked_count: sample.blocked_count,
            })
            .map_err(|err| Error::Output(format!("failed to write series: {}", err)))?;
        }
    }
    wtr.flush()
        .map_err(|err| Error::Output(format!("failed to write series: {}", err)))
}
