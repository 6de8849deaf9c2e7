use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

mod app;
mod commands;
mod output;
pub mod ux_error;

use app::App;
use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let overridden = from_env.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Completion(args) => return commands::completion::run(args),
        command => command,
    };

    let config = config::load_with_file(&cli.config)?;
    if !overridden {
        let level = EnvFilter::new(&config.observability.logging_level);
        if let Err(e) = filter_handle.reload(level) {
            output::warn(&format!("Could not apply log level: {}", e));
        }
    }

    let app = App::connect(&config).await?;
    let outcome = run(&app, command).await;
    app.service.flush_cache_writes().await;
    debug!("Pending cache writes flushed");

    if let Err(err) = outcome {
        match err.downcast_ref::<ux_error::UxError>() {
            Some(ux) => ux.display(),
            None => output::error(&format!("{:#}", err)),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Seed(args) => commands::seed::run(app, args).await,
        Commands::Create(args) => commands::set::create(app, args).await,
        Commands::Get(args) => commands::set::get(app, args).await,
        Commands::Show(args) => commands::set::show(app, args).await,
        Commands::Names(args) => commands::set::names(app, args).await,
        Commands::Rename(args) => commands::set::rename(app, args).await,
        Commands::Delete(args) => commands::set::delete(app, args).await,
        Commands::Add(args) => commands::item::add(app, args).await,
        Commands::Update(args) => commands::item::update(app, args).await,
        Commands::Remove(args) => commands::item::remove(app, args).await,
        Commands::Flag(args) => commands::flag::run(app, args).await,
        Commands::Completion(args) => commands::completion::run(args),
    }
}
