use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Parameters of one hospital run. Times share a single simulated unit.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SimConfig {
    #[serde(alias = "SIMULATION_TIME")]
    pub simulation_time: f64,
    #[serde(alias = "INTERARRIVAL_TIME")]
    pub interarrival_time: f64,
    #[serde(alias = "PREPARATION_UNITS")]
    pub preparation_units: u32,
    #[serde(alias = "OPERATION_UNITS")]
    pub operation_units: u32,
    #[serde(alias = "RECOVERY_UNITS")]
    pub recovery_units: u32,
    #[serde(alias = "PREPARATION_TIME")]
    pub preparation_time: f64,
    #[serde(alias = "OPERATION_TIME")]
    pub operation_time: f64,
    #[serde(alias = "RECOVERY_TIME")]
    pub recovery_time: f64,
    #[serde(default, alias = "WARM_UP")]
    pub warm_up: f64,
    #[serde(default, alias = "SEED")]
    pub seed: u64,
    #[serde(default)]
    pub operation_exit: OperationExit,
    #[serde(default)]
    pub recovery_precedence: RecoveryPrecedence,
}

/// What happens to an operating theater whose patient finishes while
/// recovery is full.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OperationExit {
    /// The theater stays occupied until a recovery bed frees up.
    #[default]
    Block,
    /// The theater is freed at once and the patient waits in recovery's queue.
    Release,
}

/// Who gets a freed recovery bed when both a theater-blocked patient and a
/// patient in recovery's own queue are waiting.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryPrecedence {
    #[default]
    BlockedFirst,
    QueueFirst,
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        let times = [
            ("simulation_time", self.simulation_time),
            ("interarrival_time", self.interarrival_time),
            ("preparation_time", self.preparation_time),
            ("operation_time", self.operation_time),
            ("recovery_time", self.recovery_time),
        ];
        for (field, value) in times {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::NonPositiveTime { field, value });
            }
        }

        let units = [
            ("preparation_units", self.preparation_units),
            ("operation_units", self.operation_units),
            ("recovery_units", self.recovery_units),
        ];
        for (field, value) in units {
            if value == 0 {
                return Err(Error::ZeroUnits(field));
            }
        }

        if !self.warm_up.is_finite() || self.warm_up < 0.0 || self.warm_up >= self.simulation_time
        {
            return Err(Error::InvalidWarmUp {
                warm_up: self.warm_up,
                simulation_time: self.simulation_time,
            });
        }

        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulation_time: 1000.0,
            interarrival_time: 25.0,
            preparation_units: 3,
            operation_units: 1,
            recovery_units: 3,
            preparation_time: 40.0,
            operation_time: 20.0,
            recovery_time: 40.0,
            warm_up: 0.0,
            seed: 0,
            operation_exit: OperationExit::default(),
            recovery_precedence: RecoveryPrecedence::default(),
        }
    }
}

impl fmt::Display for OperationExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationExit::Block => write!(f, "block"),
            OperationExit::Release => write!(f, "release"),
        }
    }
}

impl fmt::Display for RecoveryPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPrecedence::BlockedFirst => write!(f, "blocked-first"),
            RecoveryPrecedence::QueueFirst => write!(f, "queue-first"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_times() {
        let config = SimConfig {
            operation_time: 0.0,
            ..SimConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "operation_time must be > 0 (got 0)");

        let config = SimConfig {
            interarrival_time: -5.0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            simulation_time: f64::NAN,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_units() {
        let config = SimConfig {
            recovery_units: 0,
            ..SimConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "recovery_units must be greater than 0");
    }

    #[test]
    fn rejects_warm_up_past_horizon() {
        let config = SimConfig {
            warm_up: 1000.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidWarmUp { .. })
        ));
    }

    #[test]
    fn accepts_upper_case_json_keys() {
        let json = r#"{
            "SIMULATION_TIME": 1000,
            "INTERARRIVAL_TIME": 25,
            "PREPARATION_UNITS": 3,
            "OPERATION_UNITS": 1,
            "RECOVERY_UNITS": 3,
            "PREPARATION_TIME": 40,
            "OPERATION_TIME": 20,
            "RECOVERY_TIME": 40
        }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn policies_parse_from_kebab_case() {
        let toml_src = r#"
simulation_time = 500.0
interarrival_time = 25.0
preparation_units = 3
operation_units = 1
recovery_units = 3
preparation_time = 40.0
operation_time = 20.0
recovery_time = 40.0
operation_exit = "release"
recovery_precedence = "queue-first"
"#;
        let config: SimConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.operation_exit, OperationExit::Release);
        assert_eq!(config.recovery_precedence, RecoveryPrecedence::QueueFirst);
        assert_eq!(config.seed, 0);
    }
}
