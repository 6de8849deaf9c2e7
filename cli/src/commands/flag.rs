use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;

use crate::app::App;
use crate::output;
use crate::ux_error::UxError;

#[derive(Args)]
pub struct FlagArgs {
    #[arg(help = "Flag name, e.g. single_flight_on")]
    pub name: String,

    #[arg(help = "New state; prints the current state when omitted")]
    pub state: Option<FlagState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FlagState {
    On,
    Off,
}

impl FlagState {
    fn status(self) -> bool {
        self == FlagState::On
    }
}

pub async fn run(app: &App, args: FlagArgs) -> Result<()> {
    match args.state {
        Some(state) => {
            app.flags
                .set_flag(&args.name, state.status(), None)
                .await
                .map_err(UxError::from)?;
            output::success(&format!(
                "{} is now {}",
                args.name.bold(),
                output::on_off(state.status())
            ));
        }
        None => {
            let flag = app.flags.get_flag(&args.name).await;
            println!("{} {}", args.name.bold(), output::on_off(flag.status));
            if let Some(data) = flag.data {
                output::json(&data)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_state_status() {
        assert!(FlagState::On.status());
        assert!(!FlagState::Off.status());
    }
}
