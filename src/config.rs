use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{OperationExit, RecoveryPrecedence, SimConfig};

#[derive(Parser, Debug)]
#[command(
    name = "hospital-sim",
    about = "Discrete-event simulation of patient flow through preparation, operation and recovery"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single simulation and print its statistics.
    Run(RunArgs),
    /// Run independent replications and print confidence intervals.
    Replicate(ReplicateArgs),
    /// Print the resolved configuration without running it.
    ShowConfig(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML or JSON file; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub simulation_time: Option<f64>,
    #[arg(long)]
    pub interarrival_time: Option<f64>,
    #[arg(long)]
    pub preparation_units: Option<u32>,
    #[arg(long)]
    pub operation_units: Option<u32>,
    #[arg(long)]
    pub recovery_units: Option<u32>,
    #[arg(long)]
    pub preparation_time: Option<f64>,
    #[arg(long)]
    pub operation_time: Option<f64>,
    #[arg(long)]
    pub recovery_time: Option<f64>,
    #[arg(long)]
    pub warm_up: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, value_enum)]
    pub operation_exit: Option<ExitArg>,
    #[arg(long, value_enum)]
    pub recovery_precedence: Option<PrecedenceArg>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[arg(long, value_enum, default_value = "human")]
    pub format: FormatArg,
    /// Stop after this many events.
    #[arg(long)]
    pub max_events: Option<u64>,
    /// Write the per-stage time series to this CSV file.
    #[arg(long)]
    pub series: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplicateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[arg(long, default_value_t = 10)]
    pub runs: usize,
    #[arg(long, value_enum, default_value = "human")]
    pub format: FormatArg,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Summary,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ExitArg {
    Block,
    Release,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PrecedenceArg {
    BlockedFirst,
    QueueFirst,
}

impl From<ExitArg> for OperationExit {
    fn from(value: ExitArg) -> Self {
        match value {
            ExitArg::Block => OperationExit::Block,
            ExitArg::Release => OperationExit::Release,
        }
    }
}

impl From<PrecedenceArg> for RecoveryPrecedence {
    fn from(value: PrecedenceArg) -> Self {
        match value {
            PrecedenceArg::BlockedFirst => RecoveryPrecedence::BlockedFirst,
            PrecedenceArg::QueueFirst => RecoveryPrecedence::QueueFirst,
        }
    }
}

pub fn parse_args() -> Result<Cli> {
    match Cli::try_parse() {
        Ok(cli) => Ok(cli),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            err.exit()
        }
        Err(err) => Err(Error::Cli(err.to_string())),
    }
}

/// Loads the config file if one was given, applies flag overrides, and
/// validates the result.
pub fn resolve_config(args: &ConfigArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SimConfig::default(),
    };

    if let Some(value) = args.simulation_time {
        config.simulation_time = value;
    }
    if let Some(value) = args.interarrival_time {
        config.interarrival_time = value;
    }
    if let Some(value) = args.preparation_units {
        config.preparation_units = value;
    }
    if let Some(value) = args.operation_units {
        config.operation_units = value;
    }
    if let Some(value) = args.recovery_units {
        config.recovery_units = value;
    }
    if let Some(value) = args.preparation_time {
        config.preparation_time = value;
    }
    if let Some(value) = args.operation_time {
        config.operation_time = value;
    }
    if let Some(value) = args.recovery_time {
        config.recovery_time = value;
    }
    if let Some(value) = args.warm_up {
        config.warm_up = value;
    }
    if let Some(value) = args.seed {
        config.seed = value;
    }
    if let Some(value) = args.operation_exit {
        config.operation_exit = value.into();
    }
    if let Some(value) = args.recovery_precedence {
        config.recovery_precedence = value.into();
    }

    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<SimConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read config '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    match ext {
        "toml" => toml::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err))),
        "json" => serde_json::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err))),
        "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => Err(Error::UnsupportedConfigFormat(ext.to_string())),
    }
}
