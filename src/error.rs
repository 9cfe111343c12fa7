use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{field} must be > 0 (got {value})")]
    NonPositiveTime { field: &'static str, value: f64 },
    #[error("{0} must be greater than 0")]
    ZeroUnits(&'static str),
    #[error("warm_up must be >= 0 and < simulation_time (got {warm_up}, simulation_time {simulation_time})")]
    InvalidWarmUp { warm_up: f64, simulation_time: f64 },
    #[error("exponential mean must be > 0 (got {0})")]
    InvalidMean(f64),
    #[error("replications must be at least 2 (got {0})")]
    InvalidReplications(usize),
    #[error("simulation has already been started")]
    AlreadyStarted,
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Output(String),
    #[error("{0}")]
    Cli(String),
}

pub type Result<T> = std::result::Result<T, Error>;
