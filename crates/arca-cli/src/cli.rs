use std::path::PathBuf;

use arca_types::{ModelId, PrimaryKey};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arca",
    about = "Arca: backup and restore for model registries",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with backup and restore defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a full backup of a store
    Backup(BackupArgs),
    /// Write a backup of records modified since a point in time
    Incremental(IncrementalArgs),
    /// Show what an archive contains
    Preview(PreviewArgs),
    /// Check that an archive can be restored into a store
    Verify(VerifyArgs),
    /// Restore a whole archive into a store
    Restore(RestoreArgs),
    /// Restore selected models or records from an archive
    Select(SelectArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    /// JSON snapshot of the store
    #[arg(long)]
    pub store: PathBuf,
}

#[derive(Args)]
pub struct BackupArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(short, long)]
    pub out: PathBuf,
    /// Model to include; repeat for several. Defaults to every model.
    #[arg(short, long = "model")]
    pub models: Vec<ModelId>,
    #[arg(long)]
    pub no_attachments: bool,
}

#[derive(Args)]
pub struct IncrementalArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(short, long)]
    pub out: PathBuf,
    /// RFC 3339 instant; records modified at or after it are included
    #[arg(long)]
    pub since: DateTime<Utc>,
    #[arg(short, long = "model")]
    pub models: Vec<ModelId>,
}

#[derive(Args)]
pub struct PreviewArgs {
    pub archive: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub archive: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct RestoreArgs {
    pub archive: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(long)]
    pub preserve_ids: bool,
    #[arg(long, requires = "preserve_ids")]
    pub skip_existing: bool,
}

#[derive(Args)]
pub struct SelectArgs {
    pub archive: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(short, long = "model")]
    pub models: Vec<ModelId>,
    /// Original primary key of a record to restore; repeatable
    #[arg(long = "pk")]
    pub pks: Vec<PrimaryKey>,
    #[arg(long)]
    pub preserve_ids: bool,
    #[arg(long, requires = "preserve_ids")]
    pub skip_existing: bool,
}
