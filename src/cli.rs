use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tracker", version, about = "Task log with weekly productivity summaries")]
pub struct Cli {
    /// Workspace directory holding config/, state/ and logs/
    #[arg(long, env = "TRACKER_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Print command results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log a task
    Add(AddArgs),
    /// Change fields of a logged task
    Edit(EditArgs),
    /// Remove one task by its list position
    Delete(IndexArgs),
    /// Remove every task
    Clear,
    /// Show logged tasks
    List,
    /// Generate summaries for completed weeks that have none
    Backfill,
    /// Summarize the week containing a date (default: this week)
    Summarize(SummarizeArgs),
    /// Show stored weekly summaries, oldest week first
    History,
    /// Search past summaries
    Search(SearchArgs),
    /// Minutes per task and per day, split by focus level
    Stats,
    /// Report whether a new week started since the last summary
    NewWeek,
    /// Store the Anthropic API key in the OS keyring
    SetApiKey(SetApiKeyArgs),
}

#[derive(Args)]
pub struct AddArgs {
    pub name: String,

    /// Minutes spent
    #[arg(long, short = 'm')]
    pub minutes: u32,

    /// low, medium or high
    #[arg(long, short = 'f', default_value = "medium")]
    pub focus: String,

    /// YYYY-MM-DD or RFC 3339 (default: today)
    #[arg(long, short = 'd')]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct EditArgs {
    /// Position shown by `tracker list` (starting at 1)
    pub index: usize,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, short = 'm')]
    pub minutes: Option<u32>,

    #[arg(long, short = 'f')]
    pub focus: Option<String>,

    #[arg(long, short = 'd')]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct IndexArgs {
    /// Position shown by `tracker list` (starting at 1)
    pub index: usize,
}

#[derive(Args)]
pub struct SummarizeArgs {
    #[arg(long, short = 'd')]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct SearchArgs {
    pub query: String,
}

#[derive(Args)]
pub struct SetApiKeyArgs {
    pub api_key: String,
}
