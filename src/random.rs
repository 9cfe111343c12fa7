//! Random duration sources for arrivals and services.
//!
//! Each logical stream owns its own generator so that changing one stage's
//! mean, or the number of draws it makes, never shifts the samples seen by
//! another stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::models::SimConfig;
use crate::stage::StageKind;

const STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// A logical source of durations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stream {
    Interarrival,
    Service(StageKind),
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::Interarrival,
        Stream::Service(StageKind::Preparation),
        Stream::Service(StageKind::Operation),
        Stream::Service(StageKind::Recovery),
    ];

    fn index(self) -> usize {
        match self {
            Stream::Interarrival => 0,
            Stream::Service(kind) => 1 + kind.index(),
        }
    }
}

/// Produces the next duration for a stream.
pub trait DurationSource {
    fn sample(&mut self, stream: Stream) -> f64;
}

/// Exponential distribution sampled by inverse CDF.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exponential {
    mean: f64,
}

impl Exponential {
    pub fn new(mean: f64) -> Result<Self> {
        if !mean.is_finite() || mean <= 0.0 {
            return Err(Error::InvalidMean(mean));
        }
        Ok(Self { mean })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let mut u = rng.gen::<f64>();
        if u <= f64::MIN_POSITIVE {
            u = f64::MIN_POSITIVE;
        }
        -u.ln() * self.mean
    }
}

/// One seeded generator and distribution per stream.
pub struct ExponentialStreams {
    streams: [(Exponential, StdRng); 4],
}

impl ExponentialStreams {
    pub fn new(seed: u64, means: [f64; 4]) -> Result<Self> {
        let mut built = Vec::with_capacity(means.len());
        for (idx, mean) in means.into_iter().enumerate() {
            built.push((Exponential::new(mean)?, stream_rng(seed, idx)));
        }
        let streams = built
            .try_into()
            .map_err(|_| Error::Invariant("expected four duration streams".to_string()))?;
        Ok(Self { streams })
    }

    pub fn from_config(config: &SimConfig) -> Result<Self> {
        Self::new(
            config.seed,
            [
                config.interarrival_time,
                config.preparation_time,
                config.operation_time,
                config.recovery_time,
            ],
        )
    }
}

impl DurationSource for ExponentialStreams {
    fn sample(&mut self, stream: Stream) -> f64 {
        let (dist, rng) = &mut self.streams[stream.index()];
        dist.sample(rng)
    }
}

fn stream_rng(seed: u64, idx: usize) -> StdRng {
    let salt = (idx as u64 + 1).wrapping_mul(STREAM_MIX);
    StdRng::seed_from_u64(seed ^ salt)
}

/// Replays fixed durations per stream. A drained stream yields infinity, so
/// the event it would schedule never fires.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDurations {
    streams: [VecDeque<f64>; 4],
}

impl ScriptedDurations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stream: Stream, durations: &[f64]) -> Self {
        self.streams[stream.index()].extend(durations.iter().copied());
        self
    }

    pub fn remaining(&self, stream: Stream) -> usize {
        self.streams[stream.index()].len()
    }
}

impl DurationSource for ScriptedDurations {
    fn sample(&mut self, stream: Stream) -> f64 {
        self.streams[stream.index()]
            .pop_front()
            .unwrap_or(f64::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(source: &mut impl DurationSource, stream: Stream, count: usize) -> Vec<f64> {
        (0..count).map(|_| source.sample(stream)).collect()
    }

    #[test]
    fn rejects_non_positive_mean() {
        assert!(matches!(Exponential::new(0.0), Err(Error::InvalidMean(_))));
        assert!(matches!(Exponential::new(-1.0), Err(Error::InvalidMean(_))));
        assert!(ExponentialStreams::new(1, [25.0, 40.0, 0.0, 40.0]).is_err());
    }

    #[test]
    fn samples_are_non_negative_with_matching_mean() {
        let dist = Exponential::new(20.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<f64> = (0..50_000).map(|_| dist.sample(&mut rng)).collect();
        assert!(samples.iter().all(|value| *value >= 0.0 && value.is_finite()));
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - 20.0).abs() < 0.5, "sample mean was {}", mean);
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let means = [25.0, 40.0, 20.0, 40.0];
        let mut a = ExponentialStreams::new(42, means).unwrap();
        let mut b = ExponentialStreams::new(42, means).unwrap();
        for stream in Stream::ALL {
            assert_eq!(draw(&mut a, stream, 10), draw(&mut b, stream, 10));
        }
    }

    #[test]
    fn streams_are_independent_of_each_other() {
        let mut a = ExponentialStreams::new(9, [25.0, 40.0, 20.0, 40.0]).unwrap();
        let mut b = ExponentialStreams::new(9, [25.0, 40.0, 20.0, 400.0]).unwrap();

        // Interleave extra recovery draws on one side only.
        let _ = draw(&mut b, Stream::Service(StageKind::Recovery), 5);
        let arrivals_a = draw(&mut a, Stream::Interarrival, 20);
        let _ = draw(&mut b, Stream::Service(StageKind::Recovery), 3);
        let arrivals_b = draw(&mut b, Stream::Interarrival, 20);
        assert_eq!(arrivals_a, arrivals_b);

        let prep = Stream::Service(StageKind::Preparation);
        assert_eq!(draw(&mut a, prep, 10), draw(&mut b, prep, 10));
    }

    #[test]
    fn scripted_durations_drain_to_infinity() {
        let mut source = ScriptedDurations::new().with(Stream::Interarrival, &[1.0, 2.5]);
        assert_eq!(source.remaining(Stream::Interarrival), 2);
        assert_eq!(source.sample(Stream::Interarrival), 1.0);
        assert_eq!(source.sample(Stream::Interarrival), 2.5);
        assert!(source.sample(Stream::Interarrival).is_infinite());
        assert!(source
            .sample(Stream::Service(StageKind::Operation))
            .is_infinite());
    }
}
