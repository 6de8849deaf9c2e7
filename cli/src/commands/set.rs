use anyhow::Result;
use clap::Args;
use colored::Colorize;
use cs_core::{ConfigSet, ItemValue, MaxAge};

use crate::app::App;
use crate::output;
use crate::ux_error::UxError;

#[derive(Args)]
pub struct NameArgs {
    #[arg(help = "Set name")]
    pub name: String,
}

#[derive(Args)]
pub struct GetArgs {
    #[arg(help = "Set name")]
    pub name: String,

    #[arg(
        long,
        help = "Oldest acceptable cached copy in milliseconds; any age when omitted"
    )]
    pub max_age_ms: Option<u64>,

    #[arg(long, help = "Pretty-print the JSON")]
    pub pretty: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(help = "Set name")]
    pub name: String,

    #[arg(long, help = "Output the stored set as JSON")]
    pub json: bool,
}

#[derive(Args)]
pub struct NamesArgs {
    #[arg(long, default_value_t = 100, help = "Maximum number of names")]
    pub limit: usize,

    #[arg(long, default_value_t = 0, help = "Names to skip")]
    pub skip: usize,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Args)]
pub struct RenameArgs {
    #[arg(help = "Current set name")]
    pub name: String,

    #[arg(help = "New set name")]
    pub new_name: String,
}

pub async fn create(app: &App, args: NameArgs) -> Result<()> {
    let set = app
        .service
        .create_set(&args.name)
        .await
        .map_err(UxError::from)?;
    output::success(&format!("Created set {}", set.name.cyan()));
    Ok(())
}

pub async fn get(app: &App, args: GetArgs) -> Result<()> {
    let max_age = MaxAge::from_millis(args.max_age_ms);
    let json = app
        .reader
        .get_set_json(&args.name, max_age)
        .await
        .map_err(UxError::from)?;

    output::resolved(&json, args.pretty)?;
    Ok(())
}

pub async fn show(app: &App, args: ShowArgs) -> Result<()> {
    let set = app
        .service
        .get_set(&args.name)
        .await
        .map_err(UxError::from)?;

    if args.json {
        output::json(&set)?;
        return Ok(());
    }

    print_set(&set);
    Ok(())
}

pub async fn names(app: &App, args: NamesArgs) -> Result<()> {
    let names = app
        .service
        .get_set_names(args.limit, args.skip)
        .await
        .map_err(UxError::from)?;

    if args.json {
        output::json(&names)?;
        return Ok(());
    }

    if names.is_empty() {
        output::hint("No sets yet. Create one with 'olive create <NAME>'.");
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

pub async fn rename(app: &App, args: RenameArgs) -> Result<()> {
    let set = app
        .service
        .rename_set(&args.name, &args.new_name)
        .await
        .map_err(UxError::from)?;
    output::success(&format!(
        "Renamed {} to {}",
        args.name.cyan(),
        set.name.cyan()
    ));
    Ok(())
}

pub async fn delete(app: &App, args: NameArgs) -> Result<()> {
    let set = app
        .service
        .delete_set(&args.name)
        .await
        .map_err(UxError::from)?;
    output::success(&format!(
        "Deleted {} ({} items)",
        set.name.cyan(),
        set.items.len()
    ));
    Ok(())
}

pub(crate) fn print_set(set: &ConfigSet) {
    output::header(&set.name);
    println!(
        "{} {}   {} {}",
        "created:".dimmed(),
        set.created_at.to_rfc3339(),
        "updated:".dimmed(),
        set.updated_at.to_rfc3339()
    );
    println!();

    if set.items.is_empty() {
        println!("  {}", "(no items)".dimmed());
        return;
    }

    for item in set.items.values() {
        let value = match &item.value {
            ItemValue::Plain(v) => v.to_string(),
            ItemValue::SecretRef(name) => format!("secret:{}", name).yellow().to_string(),
            ItemValue::NestedRef(name) => format!("set:{}", name).green().to_string(),
        };
        println!("  {} = {}", item.key.bold(), value);
    }
}
