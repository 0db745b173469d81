use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline until the input is exhausted or a shutdown signal
    Run {
        #[arg(long, help = "Directory of newline-delimited JSON input files")]
        input: PathBuf,

        #[arg(long, help = "Root directory written batches are stored under")]
        output: PathBuf,

        #[arg(long, help = "Dead-letter store directory")]
        dead_letters: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        #[arg(long, help = "Print the run summary as JSON instead of a table")]
        json: bool,
    },
    /// Validate and transform the input without writing anything
    Check {
        #[arg(long, help = "Directory of newline-delimited JSON input files")]
        input: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        #[arg(long, help = "Print the report as JSON instead of a table")]
        json: bool,
    },
    /// List entries of a dead-letter store
    DeadLetters {
        #[arg(long, help = "Dead-letter store directory")]
        path: PathBuf,

        #[arg(long, help = "Only show the most recent N entries")]
        limit: Option<usize>,

        #[arg(long, help = "Print entries as JSON instead of a table")]
        json: bool,
    },
}

/// Overrides applied on top of `CLICKSTREAM_*` variables.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    #[arg(long, help = "Load CLICKSTREAM_* variables from this .env file")]
    pub env_file: Option<PathBuf>,

    #[arg(long, help = "Number of ingestion workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Number of window/writer shards")]
    pub shards: Option<usize>,

    #[arg(
        long,
        help = "Partition rule: daily, daily_by_type, hourly or hourly_by_type"
    )]
    pub partition_rule: Option<String>,

    #[arg(long, help = "Close batches at this many records")]
    pub batch_max_records: Option<usize>,
}
