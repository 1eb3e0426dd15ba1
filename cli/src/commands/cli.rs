use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Bar,
    Log,
    Jsonl,
    None,
}

impl ProgressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Log => "log",
            Self::Jsonl => "jsonl",
            Self::None => "none",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "procpool", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Job list, one command per line. `-` reads standard input.
    #[arg(default_value = "-")]
    pub file: String,

    /// Concurrent workers; overrides the config file and PROCPOOL_WORKERS.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run each line through the system shell instead of splitting it on whitespace.
    #[arg(long)]
    pub shell: bool,

    /// Run the jobs one after another as a single chain.
    #[arg(long)]
    pub chain: bool,

    /// Abort the batch on the first failing job.
    #[arg(long)]
    pub fail_fast: bool,

    #[arg(long, value_enum, default_value_t = ProgressKind::Bar)]
    pub progress: ProgressKind,

    /// Working directory for every job.
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
}
