use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drives the Analyze → Extract → Illustrate pipeline against a book
/// directory produced by an upstream parser (book-format parsing is out
/// of scope for this tool; see `--chapters`).
#[derive(Parser, Debug)]
#[command(name = "imaginize", about = "Book-to-illustrated-markdown pipeline")]
pub struct CliArgs {
    /// Book output directory (created if absent).
    #[arg(long)]
    pub book_dir: PathBuf,

    /// Path to a JSON array of ChapterSpec, as produced by an upstream
    /// parser.
    #[arg(long)]
    pub chapters: PathBuf,

    /// Stable identifier for this book (defaults to a hash of `book_dir`).
    #[arg(long)]
    pub book_id: Option<String>,

    /// Series root directory, if this book participates in a series.
    #[arg(long)]
    pub series_root: Option<PathBuf>,

    /// Chapter selection expression, e.g. "1-5,10".
    #[arg(long)]
    pub select: Option<String>,

    /// Cap the number of chapters processed in one invocation.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Clear manifest/shard state for the targeted chapters before running.
    #[arg(long)]
    pub force: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run only the Analyze phase.
    Analyze,
    /// Run only the Extract phase.
    Extract,
    /// Run only the Illustrate phase.
    Illustrate,
    /// Run all three phases in order.
    Run,
    /// Resume: equivalent to `run`, but requires prior state to exist.
    Continue,
}
