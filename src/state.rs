use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};
use crate::stage::StageKind;
use crate::stats::Sample;

pub type PatientId = u64;

/// Where a patient is in the pipeline. Declaration order is the only
/// allowed direction of travel, though phases may be skipped.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatientPhase {
    Arrived,
    WaitingPreparation,
    InPreparation,
    WaitingOperation,
    InOperation,
    /// Finished operating but still holding the theater.
    BlockedInOperation,
    WaitingRecovery,
    InRecovery,
    Departed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StageTimes {
    /// Joined the stage's queue or server.
    pub entered: Option<f64>,
    /// Seized a server.
    pub started: Option<f64>,
    /// Service finished.
    pub exited: Option<f64>,
}

impl StageTimes {
    pub fn wait(&self) -> Option<f64> {
        Some(self.started? - self.entered?)
    }

    pub fn sojourn(&self) -> Option<f64> {
        Some(self.exited? - self.entered?)
    }
}

#[derive(Clone, Debug)]
pub struct Patient {
    pub id: PatientId,
    pub arrival: f64,
    pub phase: PatientPhase,
    pub stages: [StageTimes; 3],
    pub blocked_since: Option<f64>,
    pub blocked_for: f64,
}

impl Patient {
    pub fn new(id: PatientId, arrival: f64) -> Self {
        Self {
            id,
            arrival,
            phase: PatientPhase::Arrived,
            stages: [StageTimes::default(); 3],
            blocked_since: None,
            blocked_for: 0.0,
        }
    }

    pub fn advance(&mut self, next: PatientPhase) -> Result<()> {
        if next <= self.phase {
            return Err(Error::Invariant(format!(
                "patient {} cannot move from {:?} to {:?}",
                self.id, self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }

    pub fn times(&self, stage: StageKind) -> &StageTimes {
        &self.stages[stage.index()]
    }

    pub fn times_mut(&mut self, stage: StageKind) -> &mut StageTimes {
        &mut self.stages[stage.index()]
    }

    pub fn into_record(self, departed: f64) -> PatientRecord {
        PatientRecord {
            id: self.id,
            arrival: self.arrival,
            preparation: self.stages[StageKind::Preparation.index()],
            operation: self.stages[StageKind::Operation.index()],
            recovery: self.stages[StageKind::Recovery.index()],
            blocked_for: self.blocked_for,
            departed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub arrival: f64,
    pub preparation: StageTimes,
    pub operation: StageTimes,
    pub recovery: StageTimes,
    pub blocked_for: f64,
    pub departed: f64,
}

impl PatientRecord {
    pub fn time_in_system(&self) -> f64 {
        self.departed - self.arrival
    }

    pub fn stage(&self, stage: StageKind) -> &StageTimes {
        match stage {
            StageKind::Preparation => &self.preparation,
            StageKind::Operation => &self.operation,
            StageKind::Recovery => &self.recovery,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    Horizon,
    CalendarExhausted,
    EventLimit,
    Aborted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Horizon => write!(f, "horizon"),
            StopReason::CalendarExhausted => write!(f, "calendar-exhausted"),
            StopReason::EventLimit => write!(f, "event-limit"),
            StopReason::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunMetadata {
    pub seed: u64,
    pub simulation_time: f64,
    pub warm_up: f64,
    /// Time up to which statistics were integrated.
    pub end_time: f64,
    pub events_processed: u64,
    pub stop_reason: StopReason,
}

#[derive(Clone, Debug, Serialize)]
pub struct StageSummary {
    pub stage: StageKind,
    pub capacity: u32,
    pub admissions: u64,
    pub avg_queue_length: f64,
    pub avg_busy: f64,
    pub utilization: f64,
    pub avg_blocked: f64,
    pub blocked_fraction: f64,
    /// Mean wait before service, over departed patients.
    pub avg_wait: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PatientCounts {
    pub arrived: u64,
    pub departed: u64,
    pub in_system: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct StageSeries {
    pub stage: StageKind,
    pub samples: Vec<Sample>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationResult {
    pub metadata: RunMetadata,
    pub stages: Vec<StageSummary>,
    pub patients: PatientCounts,
    pub avg_time_in_system: Option<f64>,
    pub departures: Vec<PatientRecord>,
    pub series: Vec<StageSeries>,
}

impl SimulationResult {
    pub fn stage(&self, kind: StageKind) -> &StageSummary {
        &self.stages[kind.index()]
    }
}
