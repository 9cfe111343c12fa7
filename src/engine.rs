use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::events::{Calendar, Event, ScheduledEvent};
use crate::models::{OperationExit, RecoveryPrecedence, SimConfig};
use crate::random::{DurationSource, ExponentialStreams, Stream};
use crate::stage::{Admission, ResourceStage, Stage, StageKind};
use crate::state::{
    Patient, PatientCounts, PatientId, PatientPhase, PatientRecord, RunMetadata,
    SimulationResult, StageSummary, StopReason,
};
use crate::stats::{Levels, StatsAccumulator};

#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    pub store_patients: bool,
    pub record_series: bool,
    /// Stop after this many events, even before the horizon.
    pub max_events: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            store_patients: true,
            record_series: false,
            max_events: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    NotStarted,
    Running,
    Finished(StopReason),
    Failed,
}

pub struct SimulationEngine {
    config: SimConfig,
    options: RunOptions,
    state: RunState,
    calendar: Calendar,
    stages: [ResourceStage; 3],
    source: Box<dyn DurationSource>,
    stats: StatsAccumulator,
    patients: BTreeMap<PatientId, Patient>,
    blocked: VecDeque<PatientId>,
    departures: Vec<PatientRecord>,
    next_id: PatientId,
    arrived: u64,
    departed: u64,
    events_processed: u64,
    total_time_in_system: f64,
    total_wait: [f64; 3],
}

impl SimulationEngine {
    pub fn new(
        config: SimConfig,
        source: Box<dyn DurationSource>,
        options: RunOptions,
    ) -> Result<Self> {
        config.validate()?;
        let stages = [
            ResourceStage::new(StageKind::Preparation, config.preparation_units)?,
            ResourceStage::new(StageKind::Operation, config.operation_units)?,
            ResourceStage::new(StageKind::Recovery, config.recovery_units)?,
        ];
        let initial = std::array::from_fn(|idx| Levels::of(&stages[idx]));
        let stats = StatsAccumulator::new(config.warm_up, initial, options.record_series);

        Ok(Self {
            config,
            options,
            state: RunState::NotStarted,
            calendar: Calendar::new(),
            stages,
            source,
            stats,
            patients: BTreeMap::new(),
            blocked: VecDeque::new(),
            departures: Vec::new(),
            next_id: 1,
            arrived: 0,
            departed: 0,
            events_processed: 0,
            total_time_in_system: 0.0,
            total_wait: [0.0; 3],
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn now(&self) -> f64 {
        self.calendar.now()
    }

    pub fn next_event_time(&self) -> Option<f64> {
        self.calendar.peek_time()
    }

    pub fn stage(&self, kind: StageKind) -> &ResourceStage {
        &self.stages[kind.index()]
    }

    pub fn patient(&self, id: PatientId) -> Option<&Patient> {
        self.patients.get(&id)
    }

    /// Patients holding an operating theater while waiting for recovery,
    /// oldest first.
    pub fn blocked(&self) -> impl Iterator<Item = PatientId> + '_ {
        self.blocked.iter().copied()
    }

    pub fn arrived(&self) -> u64 {
        self.arrived
    }

    pub fn departed(&self) -> u64 {
        self.departed
    }

    pub fn in_system(&self) -> u64 {
        self.patients.len() as u64
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn stats(&self) -> &StatsAccumulator {
        &self.stats
    }

    /// Schedules the first arrival.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RunState::NotStarted {
            return Err(Error::AlreadyStarted);
        }
        let gap = self.source.sample(Stream::Interarrival);
        self.calendar.schedule(gap, Event::Arrival)?;
        self.state = RunState::Running;
        Ok(())
    }

    /// Processes one event. Returns `false` once the run has stopped.
    pub fn step(&mut self) -> Result<bool> {
        match self.state {
            RunState::NotStarted => self.start()?,
            RunState::Running => {}
            RunState::Finished(_) | RunState::Failed => return Ok(false),
        }

        if let Some(limit) = self.options.max_events {
            if self.events_processed >= limit {
                self.state = RunState::Finished(StopReason::EventLimit);
                return Ok(false);
            }
        }

        match self.calendar.peek_time() {
            None => {
                self.state = RunState::Finished(StopReason::CalendarExhausted);
                return Ok(false);
            }
            Some(time) if time > self.config.simulation_time => {
                self.state = RunState::Finished(StopReason::Horizon);
                return Ok(false);
            }
            Some(_) => {}
        }

        let Some(scheduled) = self.calendar.pop_next() else {
            self.state = RunState::Finished(StopReason::CalendarExhausted);
            return Ok(false);
        };

        if let Err(err) = self.process(scheduled) {
            self.state = RunState::Failed;
            return Err(err);
        }
        Ok(true)
    }

    pub fn run(mut self) -> Result<SimulationResult> {
        while self.step()? {}
        self.finish()
    }

    /// Flushes statistics and builds the result. A run still in progress is
    /// treated as aborted at the time of its last event.
    pub fn finish(mut self) -> Result<SimulationResult> {
        let stop_reason = match self.state {
            RunState::Finished(reason) => reason,
            RunState::Running => StopReason::Aborted,
            RunState::NotStarted => {
                return Err(Error::Invariant("simulation was never started".to_string()))
            }
            RunState::Failed => {
                return Err(Error::Invariant(
                    "simulation failed; statistics are incomplete".to_string(),
                ))
            }
        };
        self.state = RunState::Finished(stop_reason);

        let end_time = match stop_reason {
            StopReason::Horizon | StopReason::CalendarExhausted => self.config.simulation_time,
            StopReason::EventLimit | StopReason::Aborted => self.calendar.now(),
        }
        .max(self.stats.last_sample());
        self.stats.finish(end_time)?;

        info!(
            ?stop_reason,
            events = self.events_processed,
            end_time,
            arrived = self.arrived,
            departed = self.departed,
            "simulation finished"
        );

        let departed = self.departed;
        let stages = StageKind::ALL
            .into_iter()
            .map(|kind| {
                let stage = &self.stages[kind.index()];
                let averages = self.stats.averages(kind);
                let capacity = f64::from(stage.capacity());
                StageSummary {
                    stage: kind,
                    capacity: stage.capacity(),
                    admissions: stage.admissions(),
                    avg_queue_length: averages.queue_length,
                    avg_busy: averages.busy,
                    utilization: averages.busy / capacity,
                    avg_blocked: averages.blocked,
                    blocked_fraction: averages.blocked / capacity,
                    avg_wait: (departed > 0)
                        .then(|| self.total_wait[kind.index()] / departed as f64),
                }
            })
            .collect();

        Ok(SimulationResult {
            metadata: RunMetadata {
                seed: self.config.seed,
                simulation_time: self.config.simulation_time,
                warm_up: self.config.warm_up,
                end_time,
                events_processed: self.events_processed,
                stop_reason,
            },
            stages,
            patients: PatientCounts {
                arrived: self.arrived,
                departed,
                in_system: self.patients.len() as u64,
            },
            avg_time_in_system: (departed > 0)
                .then(|| self.total_time_in_system / departed as f64),
            departures: std::mem::take(&mut self.departures),
            series: self.stats.take_series(),
        })
    }

    fn process(&mut self, scheduled: ScheduledEvent) -> Result<()> {
        let now = scheduled.time();
        self.events_processed += 1;
        trace!(time = now, event = ?scheduled.event, "event");

        match scheduled.event {
            Event::Arrival => self.on_arrival(now)?,
            Event::PreparationDone(id) => self.on_preparation_done(id, now)?,
            Event::OperationDone(id) => self.on_operation_done(id, now)?,
            Event::RecoveryDone(id) => self.on_recovery_done(id, now)?,
        }

        self.check_invariants()?;
        let levels = self.levels();
        self.stats.update(now, levels)
    }

    fn on_arrival(&mut self, now: f64) -> Result<()> {
        let id = self.next_id;
        self.next_id += 1;
        self.arrived += 1;

        let gap = self.source.sample(Stream::Interarrival);
        self.calendar.schedule(now + gap, Event::Arrival)?;

        debug!(patient = id, time = now, "patient arrives");
        let mut patient = Patient::new(id, now);
        patient.times_mut(StageKind::Preparation).entered = Some(now);
        self.patients.insert(id, patient);
        self.enter_stage(id, StageKind::Preparation, now)
    }

    fn on_preparation_done(&mut self, id: PatientId, now: f64) -> Result<()> {
        self.patient_mut(id)?.times_mut(StageKind::Preparation).exited = Some(now);
        debug!(patient = id, time = now, "patient leaves preparation");

        if let Some(next) = self.stages[StageKind::Preparation.index()].release()? {
            self.start_service(next, StageKind::Preparation, now)?;
        }

        self.patient_mut(id)?.times_mut(StageKind::Operation).entered = Some(now);
        self.enter_stage(id, StageKind::Operation, now)
    }

    fn on_operation_done(&mut self, id: PatientId, now: f64) -> Result<()> {
        self.patient_mut(id)?.times_mut(StageKind::Operation).exited = Some(now);
        debug!(patient = id, time = now, "patient finishes operation");

        match self.config.operation_exit {
            OperationExit::Block => {
                let recovery = &mut self.stages[StageKind::Recovery.index()];
                if recovery.has_free_server() {
                    if recovery.try_admit(id) != Admission::Admitted {
                        return Err(Error::Invariant(format!(
                            "patient {} refused by recovery with a free server",
                            id
                        )));
                    }
                    self.patient_mut(id)?.times_mut(StageKind::Recovery).entered = Some(now);
                    self.release_operation(now)?;
                    self.start_service(id, StageKind::Recovery, now)
                } else {
                    self.stages[StageKind::Operation.index()].block()?;
                    let patient = self.patient_mut(id)?;
                    patient.advance(PatientPhase::BlockedInOperation)?;
                    patient.blocked_since = Some(now);
                    self.blocked.push_back(id);
                    debug!(patient = id, time = now, "recovery full, theater blocked");
                    Ok(())
                }
            }
            OperationExit::Release => {
                self.release_operation(now)?;
                self.patient_mut(id)?.times_mut(StageKind::Recovery).entered = Some(now);
                self.enter_stage(id, StageKind::Recovery, now)
            }
        }
    }

    fn on_recovery_done(&mut self, id: PatientId, now: f64) -> Result<()> {
        let recovery = &self.stages[StageKind::Recovery.index()];
        let take_blocked = !self.blocked.is_empty()
            && match self.config.recovery_precedence {
                RecoveryPrecedence::BlockedFirst => true,
                RecoveryPrecedence::QueueFirst => recovery.queue_length() == 0,
            };

        if take_blocked {
            let successor = self.blocked.pop_front().ok_or_else(|| {
                Error::Invariant("blocked list emptied during recovery hand-over".to_string())
            })?;
            self.stages[StageKind::Recovery.index()].hand_over(successor)?;
            self.unblock(successor, now)?;
            self.start_service(successor, StageKind::Recovery, now)?;
        } else if let Some(next) = self.stages[StageKind::Recovery.index()].release()? {
            self.start_service(next, StageKind::Recovery, now)?;
        }

        self.depart(id, now)
    }

    /// Moves a blocked patient out of its theater and frees that theater.
    fn unblock(&mut self, id: PatientId, now: f64) -> Result<()> {
        let patient = self.patient_mut(id)?;
        let since = patient.blocked_since.take().ok_or_else(|| {
            Error::Invariant(format!("patient {} is not blocked", id))
        })?;
        patient.blocked_for += now - since;
        patient.times_mut(StageKind::Recovery).entered = Some(now);
        debug!(patient = id, time = now, blocked_for = now - since, "theater unblocked");

        self.stages[StageKind::Operation.index()].unblock()?;
        self.release_operation(now)
    }

    fn release_operation(&mut self, now: f64) -> Result<()> {
        if let Some(next) = self.stages[StageKind::Operation.index()].release()? {
            self.start_service(next, StageKind::Operation, now)?;
        }
        Ok(())
    }

    fn enter_stage(&mut self, id: PatientId, kind: StageKind, now: f64) -> Result<()> {
        match self.stages[kind.index()].try_admit(id) {
            Admission::Admitted => self.start_service(id, kind, now),
            Admission::Queued => {
                self.patient_mut(id)?.advance(waiting_phase(kind))?;
                debug!(patient = id, time = now, stage = %kind, "patient queued");
                Ok(())
            }
        }
    }

    fn start_service(&mut self, id: PatientId, kind: StageKind, now: f64) -> Result<()> {
        let patient = self.patient_mut(id)?;
        patient.advance(service_phase(kind))?;
        patient.times_mut(kind).started = Some(now);

        let duration = self.source.sample(Stream::Service(kind));
        let done = match kind {
            StageKind::Preparation => Event::PreparationDone(id),
            StageKind::Operation => Event::OperationDone(id),
            StageKind::Recovery => Event::RecoveryDone(id),
        };
        self.calendar.schedule(now + duration, done)?;
        debug!(patient = id, time = now, stage = %kind, "patient enters stage");
        Ok(())
    }

    fn depart(&mut self, id: PatientId, now: f64) -> Result<()> {
        let mut patient = self
            .patients
            .remove(&id)
            .ok_or_else(|| Error::Invariant(format!("unknown patient {}", id)))?;
        patient.times_mut(StageKind::Recovery).exited = Some(now);
        patient.advance(PatientPhase::Departed)?;

        let record = patient.into_record(now);
        self.departed += 1;
        self.total_time_in_system += record.time_in_system();
        for kind in StageKind::ALL {
            if let Some(wait) = record.stage(kind).wait() {
                self.total_wait[kind.index()] += wait;
            }
        }
        debug!(
            patient = id,
            time = now,
            time_in_system = record.time_in_system(),
            "patient discharged"
        );

        if self.options.store_patients {
            self.departures.push(record);
        }
        Ok(())
    }

    fn patient_mut(&mut self, id: PatientId) -> Result<&mut Patient> {
        self.patients
            .get_mut(&id)
            .ok_or_else(|| Error::Invariant(format!("unknown patient {}", id)))
    }

    fn levels(&self) -> [Levels; 3] {
        std::array::from_fn(|idx| Levels::of(&self.stages[idx]))
    }

    fn check_invariants(&self) -> Result<()> {
        for stage in &self.stages {
            stage.check()?;
        }
        let operation = &self.stages[StageKind::Operation.index()];
        if operation.blocked_count() as usize != self.blocked.len() {
            return Err(Error::Invariant(format!(
                "{} blocked theaters but {} blocked patients",
                operation.blocked_count(),
                self.blocked.len()
            )));
        }
        Ok(())
    }
}

fn waiting_phase(kind: StageKind) -> PatientPhase {
    match kind {
        StageKind::Preparation => PatientPhase::WaitingPreparation,
        StageKind::Operation => PatientPhase::WaitingOperation,
        StageKind::Recovery => PatientPhase::WaitingRecovery,
    }
}

fn service_phase(kind: StageKind) -> PatientPhase {
    match kind {
        StageKind::Preparation => PatientPhase::InPreparation,
        StageKind::Operation => PatientPhase::InOperation,
        StageKind::Recovery => PatientPhase::InRecovery,
    }
}

pub fn run_simulation(config: &SimConfig) -> Result<SimulationResult> {
    run_simulation_with_options(config, RunOptions::default())
}

pub fn run_simulation_summary(config: &SimConfig) -> Result<SimulationResult> {
    run_simulation_with_options(
        config,
        RunOptions {
            store_patients: false,
            record_series: false,
            max_events: None,
        },
    )
}

pub fn run_simulation_with_options(
    config: &SimConfig,
    options: RunOptions,
) -> Result<SimulationResult> {
    config.validate()?;
    let source = Box::new(ExponentialStreams::from_config(config)?);
    SimulationEngine::new(config.clone(), source, options)?.run()
}
