use std::fs::File;
use std::io::BufWriter;

use hospital_sim::config::{self, Command, FormatArg, RunArgs};
use hospital_sim::engine::{self, RunOptions};
use hospital_sim::error::{Error, Result};
use hospital_sim::output::{self, Formatter, HumanFormatter, JsonFormatter, SummaryFormatter};
use hospital_sim::replication;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run() -> Result<()> {
    let cli = config::parse_args()?;
    match cli.command {
        Command::Run(args) => run_once(&args),
        Command::Replicate(args) => {
            let config = config::resolve_config(&args.config)?;
            let report = replication::run_replications(&config, args.runs)?;
            print!("{}", formatter_for(&args.format).write_replications(&report)?);
            Ok(())
        }
        Command::ShowConfig(args) => {
            let config = config::resolve_config(&args)?;
            print!("{}", output::describe_config(&config));
            Ok(())
        }
    }
}

fn run_once(args: &RunArgs) -> Result<()> {
    let config = config::resolve_config(&args.config)?;
    let options = RunOptions {
        store_patients: args.format != FormatArg::Summary,
        record_series: args.series.is_some(),
        max_events: args.max_events,
    };
    let result = engine::run_simulation_with_options(&config, options)?;

    if let Some(path) = &args.series {
        let file = File::create(path).map_err(|err| {
            Error::Output(format!(
                "failed to create '{}': {}",
                path.display(),
                err
            ))
        })?;
        output::write_series_csv(&result, BufWriter::new(file))?;
    }

    print!("{}", formatter_for(&args.format).write(&result)?);
    Ok(())
}

fn formatter_for(format: &FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Summary => Box::new(SummaryFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
    }
}
