//! Time-weighted integrals of stage occupancy.
//!
//! The accumulator holds the levels each stage had since the last sample.
//! Every update first charges those levels for the elapsed interval and only
//! then adopts the new ones, so the integrals are always exact as of
//! `last_sample`.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::stage::{Stage, StageKind};
use crate::state::StageSeries;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Levels {
    pub queue_length: usize,
    pub busy_count: u32,
    pub blocked_count: u32,
}

impl Levels {
    pub fn of<S: Stage + ?Sized>(stage: &S) -> Self {
        Self {
            queue_length: stage.queue_length(),
            busy_count: stage.busy_count(),
            blocked_count: stage.blocked_count(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub time: f64,
    pub queue_length: usize,
    pub busy_count: u32,
    pub blocked_count: u32,
}

impl Sample {
    fn new(time: f64, levels: Levels) -> Self {
        Self {
            time,
            queue_length: levels.queue_length,
            busy_count: levels.busy_count,
            blocked_count: levels.blocked_count,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Integral {
    queue: f64,
    busy: f64,
    blocked: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StageAverages {
    pub queue_length: f64,
    pub busy: f64,
    pub blocked: f64,
}

#[derive(Debug)]
pub struct StatsAccumulator {
    origin: f64,
    last_sample: f64,
    levels: [Levels; 3],
    integrals: [Integral; 3],
    series: Option<[Vec<Sample>; 3]>,
}

impl StatsAccumulator {
    /// Integration starts at `origin`; earlier intervals are not charged.
    pub fn new(origin: f64, initial: [Levels; 3], record_series: bool) -> Self {
        let series = record_series.then(|| initial.map(|levels| vec![Sample::new(0.0, levels)]));
        Self {
            origin,
            last_sample: 0.0,
            levels: initial,
            integrals: [Integral::default(); 3],
            series,
        }
    }

    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }

    pub fn levels(&self, kind: StageKind) -> Levels {
        self.levels[kind.index()]
    }

    /// Charges current levels up to `now`, then adopts `next`.
    pub fn update(&mut self, now: f64, next: [Levels; 3]) -> Result<()> {
        self.advance(now)?;
        for (idx, levels) in next.into_iter().enumerate() {
            if self.levels[idx] == levels {
                continue;
            }
            self.levels[idx] = levels;
            if let Some(series) = self.series.as_mut() {
                series[idx].push(Sample::new(now, levels));
            }
        }
        Ok(())
    }

    /// Charges current levels up to `end` and closes each series there.
    pub fn finish(&mut self, end: f64) -> Result<()> {
        self.advance(end)?;
        if let Some(series) = self.series.as_mut() {
            for (idx, samples) in series.iter_mut().enumerate() {
                if samples.last().map_or(true, |sample| sample.time < end) {
                    samples.push(Sample::new(end, self.levels[idx]));
                }
            }
        }
        Ok(())
    }

    /// Time covered by the integrals so far.
    pub fn elapsed(&self) -> f64 {
        (self.last_sample - self.origin).max(0.0)
    }

    pub fn averages(&self, kind: StageKind) -> StageAverages {
        let elapsed = self.elapsed();
        if elapsed <= 0.0 {
            return StageAverages::default();
        }
        let integral = &self.integrals[kind.index()];
        StageAverages {
            queue_length: integral.queue / elapsed,
            busy: integral.busy / elapsed,
            blocked: integral.blocked / elapsed,
        }
    }

    pub fn take_series(&mut self) -> Vec<StageSeries> {
        match self.series.take() {
            Some(series) => StageKind::ALL
                .into_iter()
                .zip(series)
                .map(|(stage, samples)| StageSeries { stage, samples })
                .collect(),
            None => Vec::new(),
        }
    }

    fn advance(&mut self, now: f64) -> Result<()> {
        if now < self.last_sample {
            return Err(Error::Invariant(format!(
                "statistics sampled at {} after {}",
                now, self.last_sample
            )));
        }
        let from = self.last_sample.max(self.origin);
        if now > from {
            let dt = now - from;
            for (integral, levels) in self.integrals.iter_mut().zip(self.levels.iter()) {
                integral.queue += levels.queue_length as f64 * dt;
                integral.busy += f64::from(levels.busy_count) * dt;
                integral.blocked += f64::from(levels.blocked_count) * dt;
            }
        }
        self.last_sample = now;
        Ok(())
    }
}
