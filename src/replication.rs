//! Independent replications of one configuration.
//!
//! Each run gets its own engine, streams and statistics, seeded
//! `seed, seed + 1, ...`, so runs share nothing and can be compared directly.

use serde::Serialize;
use tracing::debug;

use crate::engine::run_simulation_summary;
use crate::error::{Error, Result};
use crate::models::SimConfig;
use crate::stage::StageKind;

/// Two-sided 95% Student-t critical values for 1..=30 degrees of freedom.
const T_95: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160,
    2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056,
    2.052, 2.048, 2.045, 2.042,
];

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Estimate {
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std_dev: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl Estimate {
    /// Point estimate and 95% confidence interval; needs at least two samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let n = samples.len();
        if n < 2 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = samples
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f64>()
            / (n - 1) as f64;
        let std_dev = variance.sqrt();
        let margin = t_critical_95(n - 1) * std_dev / (n as f64).sqrt();
        Some(Self {
            mean,
            std_dev,
            ci_low: mean - margin,
            ci_high: mean + margin,
        })
    }
}

/// Beyond the table the value for the next lower tabulated df is used, which
/// slightly widens the interval.
fn t_critical_95(df: usize) -> f64 {
    match df {
        0 => f64::INFINITY,
        1..=30 => T_95[df - 1],
        31..=40 => 2.042,
        41..=60 => 2.021,
        61..=120 => 2.000,
        _ => 1.980,
    }
}

/// Pearson correlation between `samples[i]` and `samples[i + lag]`.
///
/// `None` when there are no more samples than `lag` or either side has zero
/// variance.
pub fn serial_correlation(samples: &[f64], lag: usize) -> Option<f64> {
    if samples.len() <= lag {
        return None;
    }
    let head = &samples[..samples.len() - lag];
    let tail = &samples[lag..];
    let n = head.len() as f64;
    let head_mean = head.iter().sum::<f64>() / n;
    let tail_mean = tail.iter().sum::<f64>() / n;

    let (mut cov, mut head_var, mut tail_var) = (0.0, 0.0, 0.0);
    for (x, y) in head.iter().zip(tail) {
        let dx = x - head_mean;
        let dy = y - tail_mean;
        cov += dx * dy;
        head_var += dx * dx;
        tail_var += dy * dy;
    }
    if head_var <= 0.0 || tail_var <= 0.0 {
        return None;
    }
    Some(cov / (head_var * tail_var).sqrt())
}

#[derive(Clone, Debug, Serialize)]
pub struct StageReplication {
    pub stage: StageKind,
    pub avg_queue_length: Estimate,
    pub utilization: Estimate,
    pub blocked_fraction: Estimate,
    /// Lag-1 correlation of the per-run average queue lengths.
    pub serial_correlation: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplicationReport {
    pub runs: usize,
    pub base_seed: u64,
    pub stages: Vec<StageReplication>,
    /// Only runs in which someone was discharged contribute.
    pub avg_time_in_system: Option<Estimate>,
}

pub fn run_replications(config: &SimConfig, runs: usize) -> Result<ReplicationReport> {
    if runs < 2 {
        return Err(Error::InvalidReplications(runs));
    }
    config.validate()?;

    let mut queue = vec![Vec::with_capacity(runs); StageKind::ALL.len()];
    let mut utilization = vec![Vec::with_capacity(runs); StageKind::ALL.len()];
    let mut blocked = vec![Vec::with_capacity(runs); StageKind::ALL.len()];
    let mut time_in_system = Vec::with_capacity(runs);

    for run in 0..runs {
        let run_config = SimConfig {
            seed: config.seed.wrapping_add(run as u64),
            ..config.clone()
        };
        let result = run_simulation_summary(&run_config)?;
        debug!(run, seed = run_config.seed, "replication finished");

        for summary in &result.stages {
            let idx = summary.stage.index();
            queue[idx].push(summary.avg_queue_length);
            utilization[idx].push(summary.utilization);
            blocked[idx].push(summary.blocked_fraction);
        }
        if let Some(value) = result.avg_time_in_system {
            time_in_system.push(value);
        }
    }

    let stages = StageKind::ALL
        .into_iter()
        .map(|stage| {
            let idx = stage.index();
            let estimate = |samples: &[f64]| {
                Estimate::from_samples(samples).ok_or(Error::InvalidReplications(samples.len()))
            };
            Ok(StageReplication {
                stage,
                avg_queue_length: estimate(&queue[idx])?,
                utilization: estimate(&utilization[idx])?,
                blocked_fraction: estimate(&blocked[idx])?,
                serial_correlation: serial_correlation(&queue[idx], 1),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ReplicationReport {
        runs,
        base_seed: config.seed,
        stages,
        avg_time_in_system: Estimate::from_samples(&time_in_system),
    })
}
