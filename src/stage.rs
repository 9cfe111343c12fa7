use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use crate::error::{Error, Result};
use crate::state::PatientId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Preparation,
    Operation,
    Recovery,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [
        StageKind::Preparation,
        StageKind::Operation,
        StageKind::Recovery,
    ];

    pub fn index(self) -> usize {
        match self {
            StageKind::Preparation => 0,
            StageKind::Operation => 1,
            StageKind::Recovery => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Preparation => "preparation",
            StageKind::Operation => "operation",
            StageKind::Recovery => "recovery",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Admitted,
    Queued,
}

/// A bounded group of servers fed by a FIFO queue.
pub trait Stage {
    fn kind(&self) -> StageKind;
    fn capacity(&self) -> u32;
    fn busy_count(&self) -> u32;
    fn blocked_count(&self) -> u32;
    fn queue_length(&self) -> usize;

    /// Seizes a server if one is free, otherwise queues the patient.
    fn try_admit(&mut self, patient: PatientId) -> Admission;

    /// Frees a server and, if anyone is queued, hands it to the queue head.
    fn release(&mut self) -> Result<Option<PatientId>>;

    /// Frees a server and gives it straight to `successor`, bypassing the queue.
    fn hand_over(&mut self, successor: PatientId) -> Result<()>;

    fn has_free_server(&self) -> bool {
        self.busy_count() < self.capacity()
    }
}

#[derive(Clone, Debug)]
pub struct ResourceStage {
    kind: StageKind,
    capacity: u32,
    busy: u32,
    blocked: u32,
    queue: VecDeque<PatientId>,
    admissions: u64,
}

impl ResourceStage {
    pub fn new(kind: StageKind, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroUnits(match kind {
                StageKind::Preparation => "preparation_units",
                StageKind::Operation => "operation_units",
                StageKind::Recovery => "recovery_units",
            }));
        }
        Ok(Self {
            kind,
            capacity,
            busy: 0,
            blocked: 0,
            queue: VecDeque::new(),
            admissions: 0,
        })
    }

    /// Number of patients that have started service here.
    pub fn admissions(&self) -> u64 {
        self.admissions
    }

    pub fn queued(&self) -> impl Iterator<Item = PatientId> + '_ {
        self.queue.iter().copied()
    }

    /// Marks one busy server as held by a patient who cannot move on.
    pub fn block(&mut self) -> Result<()> {
        if self.blocked >= self.busy {
            return Err(self.violation("block with no unblocked busy server"));
        }
        self.blocked += 1;
        Ok(())
    }

    pub fn unblock(&mut self) -> Result<()> {
        if self.blocked == 0 {
            return Err(self.violation("unblock with no blocked server"));
        }
        self.blocked -= 1;
        Ok(())
    }

    pub fn check(&self) -> Result<()> {
        if self.busy > self.capacity {
            return Err(self.violation("busy count exceeds capacity"));
        }
        if self.blocked > self.busy {
            return Err(self.violation("blocked count exceeds busy count"));
        }
        if !self.queue.is_empty() && self.busy < self.capacity {
            return Err(self.violation("patients queued while a server is free"));
        }
        Ok(())
    }

    fn violation(&self, what: &str) -> Error {
        Error::Invariant(format!(
            "{} stage: {} (busy {}, blocked {}, capacity {}, queued {})",
            self.kind,
            what,
            self.busy,
            self.blocked,
            self.capacity,
            self.queue.len()
        ))
    }
}

impl Stage for ResourceStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn busy_count(&self) -> u32 {
        self.busy
    }

    fn blocked_count(&self) -> u32 {
        self.blocked
    }

    fn queue_length(&self) -> usize {
        self.queue.len()
    }

    fn try_admit(&mut self, patient: PatientId) -> Admission {
        if self.busy < self.capacity {
            self.busy += 1;
            self.admissions += 1;
            Admission::Admitted
        } else {
            self.queue.push_back(patient);
            Admission::Queued
        }
    }

    fn release(&mut self) -> Result<Option<PatientId>> {
        if self.busy <= self.blocked {
            return Err(self.violation("release with no unblocked busy server"));
        }
        self.busy -= 1;
        match self.queue.pop_front() {
            Some(next) => {
                self.busy += 1;
                self.admissions += 1;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    fn hand_over(&mut self, _successor: PatientId) -> Result<()> {
        if self.busy <= self.blocked {
            return Err(self.violation("hand over with no unblocked busy server"));
        }
        self.admissions += 1;
        Ok(())
    }
}
