use crate::{
    commands::{Commands, SettingsArgs},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use engine_config::{
    env::EnvManager,
    settings::{PipelineSettings, validator},
};
use engine_core::{
    clock::{Clock, SystemClock},
    connectors::{
        dead_letter::{DeadLetterChannel, SledDeadLetterChannel},
        lookup::StaticRateTable,
        sink::LocalFsSink,
        source::DirectorySource,
    },
};
use engine_processing::{transform::Transformer, validation::EventValidator};
use engine_runtime::{
    check::run_check,
    error::PipelineError,
    orchestrator::{Collaborators, Orchestrator},
};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "clickstream",
    version,
    about = "Clickstream event pipeline: validate, enrich, batch and store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let code = match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

async fn execute(command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Run {
            input,
            output,
            dead_letters,
            settings,
            json,
        } => run_pipeline(&input, &output, &dead_letters, &settings, json).await,
        Commands::Check {
            input,
            settings,
            json,
        } => {
            let settings = load_settings(&settings)?;
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let source = DirectorySource::open(&input, clock.clone())?;
            let validator = EventValidator::new(settings.skew, clock);
            let transformer = Transformer::new(&settings.transform, rate_table(&settings)?);

            let report = run_check(&source, &validator, &transformer).await?;
            output::print_check(&report, json)?;
            Ok(if report.invalid == 0 {
                ExitCode::Success
            } else {
                ExitCode::GeneralError
            })
        }
        Commands::DeadLetters { path, limit, json } => {
            let channel = SledDeadLetterChannel::open(&path)?;
            let mut entries = channel.list().await?;
            if let Some(limit) = limit {
                entries = entries.split_off(entries.len().saturating_sub(limit));
            }
            output::print_dead_letters(&entries, json)?;
            Ok(ExitCode::Success)
        }
    }
}

async fn run_pipeline(
    input: &Path,
    output: &Path,
    dead_letters: &Path,
    args: &SettingsArgs,
    json: bool,
) -> Result<ExitCode, CliError> {
    let settings = load_settings(args)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let collaborators = Collaborators {
        source: Arc::new(DirectorySource::open(input, clock.clone())?),
        sink: Arc::new(LocalFsSink::new(output)),
        dead_letters: Arc::new(SledDeadLetterChannel::open(dead_letters)?),
        rates: rate_table(&settings)?,
        clock,
    };

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    info!(
        input = %input.display(),
        output = %output.display(),
        dead_letters = %dead_letters.display(),
        "Starting clickstream pipeline"
    );

    match Orchestrator::new(settings, collaborators, shutdown.cancel_token())
        .run()
        .await
    {
        Ok(summary) => {
            output::print_summary(&summary, json)?;
            Ok(if shutdown.is_shutdown_requested() {
                ExitCode::ShutdownRequested
            } else {
                ExitCode::Success
            })
        }
        Err(PipelineError::Fatal { reason, summary }) => {
            error!(reason = %reason, "Pipeline halted with unresolved records");
            output::print_summary(&summary, json)?;
            Ok(ExitCode::GeneralError)
        }
        Err(e) => Err(e.into()),
    }
}

/// Process environment, then the optional .env file, then command-line flags.
fn load_settings(args: &SettingsArgs) -> Result<PipelineSettings, CliError> {
    let mut env = EnvManager::from_process();
    if let Some(path) = &args.env_file {
        env.load_from_file(path)?;
    }

    if let Some(workers) = args.workers {
        env.set(validator::WORKERS, workers.to_string());
    }
    if let Some(shards) = args.shards {
        env.set(validator::SHARDS, shards.to_string());
    }
    if let Some(rule) = &args.partition_rule {
        env.set(validator::PARTITION_RULE, rule.clone());
    }
    if let Some(max) = args.batch_max_records {
        env.set(validator::BATCH_MAX_RECORDS, max.to_string());
    }

    Ok(PipelineSettings::from_env(&env)?)
}

fn rate_table(settings: &PipelineSettings) -> Result<Arc<StaticRateTable>, CliError> {
    let base = &settings.transform.base_currency;
    let table = match &settings.transform.rates {
        Some(pairs) => StaticRateTable::parse_pairs(base, pairs).map_err(CliError::Rates)?,
        None if base.eq_ignore_ascii_case("USD") => StaticRateTable::usd_defaults(),
        None => StaticRateTable::new(base.as_str()),
    };
    Ok(Arc::new(table))
}
