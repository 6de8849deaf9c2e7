pub mod completion;
pub mod flag;
pub mod item;
pub mod seed;
pub mod set;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "olive",
    author,
    version,
    about = "Olive - named config sets backed by Redis",
    long_about = "Create, edit and read named config sets.\n\nReads resolve secret references \
                  and nested sets into one JSON document, served from the Redis cache when \
                  it is fresh enough.\nConnection settings come from the config file and \
                  RD_* environment variables."
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "OLIVE_CONFIG_FILE",
        default_value = config::DEFAULT_CONFIG_FILE,
        help = "Configuration file (JSON, TOML or YAML)"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Fill the store with randomly generated sample sets")]
    Seed(seed::SeedArgs),

    #[command(about = "Create an empty config set")]
    Create(set::NameArgs),

    #[command(about = "Print the resolved JSON of a set")]
    Get(set::GetArgs),

    #[command(about = "Show the stored items of a set")]
    Show(set::ShowArgs),

    #[command(about = "List set names in creation order")]
    Names(set::NamesArgs),

    #[command(about = "Rename a set")]
    Rename(set::RenameArgs),

    #[command(about = "Delete a set")]
    Delete(set::NameArgs),

    #[command(about = "Add an item to a set")]
    Add(item::ItemArgs),

    #[command(about = "Replace an existing item of a set")]
    Update(item::ItemArgs),

    #[command(about = "Remove an item from a set")]
    Remove(item::RemoveArgs),

    #[command(about = "Show or switch a feature flag")]
    Flag(flag::FlagArgs),

    #[command(about = "Generate shell completions")]
    Completion(completion::CompletionArgs),
}
