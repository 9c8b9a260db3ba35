use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shelf", about = "Shelf: manage a collection of bookmarks", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Source configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store snapshot, overriding `data_path` from the configuration
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a bookmark
    Add(AddArgs),
    /// Remove a bookmark
    Rm(RmArgs),
    /// Show the attributes of a bookmark or of the root
    Get(GetArgs),
    /// Replace attributes of a bookmark
    Set(SetArgs),
    /// List bookmarks
    Ls(LsArgs),
    /// Import preset bookmarks from a TOML file, once per store
    Seed(SeedArgs),
    /// Show the source configuration and item count
    Info,
}

#[derive(Args)]
pub struct AddArgs {
    pub uri: String,
    #[arg(short, long)]
    pub title: Option<String>,
    /// Extra attribute, `key=value`, `key:int=N` or `key:long=N`
    #[arg(short, long = "attr")]
    pub attrs: Vec<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: String,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
    /// Comma-separated attribute keys, `*` for all
    #[arg(short, long, default_value = "*")]
    pub keys: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub id: String,
    /// Attributes, `key=value`, `key:int=N` or `key:long=N`
    #[arg(required = true)]
    pub attrs: Vec<String>,
}

#[derive(Args)]
pub struct LsArgs {
    /// Filter expression, e.g. `(&(bitrate>128)(title~jazz))`
    #[arg(short, long)]
    pub filter: Option<String>,
    /// Sort order, e.g. `-bitrate,+title`
    #[arg(short, long, allow_hyphen_values = true)]
    pub sort: Option<String>,
    #[arg(long, default_value = "0")]
    pub skip: usize,
    /// Maximum number of results, 0 for no limit
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: usize,
    /// Comma-separated attribute keys to show, `*` for all
    #[arg(short, long, default_value = "title,uri")]
    pub keys: String,
}

#[derive(Args)]
pub struct SeedArgs {
    pub file: PathBuf,
}
