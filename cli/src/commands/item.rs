use anyhow::Result;
use clap::Args;
use colored::Colorize;
use cs_core::{ConfigItem, ConfigSet, ItemKind};
use serde_json::Value;
use service::ItemMutationError;

use crate::app::App;
use crate::output;
use crate::ux_error::UxError;

#[derive(Args)]
pub struct ItemArgs {
    #[arg(help = "Set name")]
    pub set: String,

    #[arg(help = "Item key")]
    pub key: String,

    #[arg(help = "Value; plain values are read as JSON and fall back to a string")]
    pub value: String,

    #[arg(
        long,
        default_value_t = ItemKind::Plain,
        help = "Item kind (plain, secret, nested)"
    )]
    pub kind: ItemKind,
}

#[derive(Args)]
pub struct RemoveArgs {
    #[arg(help = "Set name")]
    pub set: String,

    #[arg(help = "Item key")]
    pub key: String,
}

pub async fn add(app: &App, args: ItemArgs) -> Result<()> {
    let item = build_item(&args)?;
    let set = app
        .service
        .add_item(item, &args.set)
        .await
        .map_err(mutation_error)?;
    output::success(&format!("Added {} to {}", args.key.bold(), set.name.cyan()));
    Ok(())
}

pub async fn update(app: &App, args: ItemArgs) -> Result<()> {
    let item = build_item(&args)?;
    let set = app
        .service
        .update_item(item, &args.set)
        .await
        .map_err(mutation_error)?;
    output::success(&format!(
        "Updated {} in {}",
        args.key.bold(),
        set.name.cyan()
    ));
    Ok(())
}

pub async fn remove(app: &App, args: RemoveArgs) -> Result<()> {
    let set = app
        .service
        .remove_item(&args.key, &args.set)
        .await
        .map_err(mutation_error)?;
    output::success(&format!(
        "Removed {} from {}",
        args.key.bold(),
        set.name.cyan()
    ));
    Ok(())
}

fn build_item(args: &ItemArgs) -> Result<ConfigItem, UxError> {
    ConfigItem::new(&args.key, parse_value(&args.value, args.kind), args.kind).map_err(UxError::from)
}

/// Plain values accept any JSON literal; references are taken verbatim.
pub(crate) fn parse_value(raw: &str, kind: ItemKind) -> Value {
    match kind {
        ItemKind::Plain => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        ItemKind::Secret | ItemKind::Nested => Value::String(raw.to_string()),
    }
}

fn mutation_error(err: ItemMutationError) -> UxError {
    if let Some(current) = &err.current {
        print_current(current);
    }
    UxError::from(err.error)
}

fn print_current(set: &ConfigSet) {
    output::info(&format!(
        "{} currently holds {} items: {}",
        set.name,
        set.items.len(),
        set.items.keys().cloned().collect::<Vec<_>>().join(", ")
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_values_parse_as_json() {
        assert_eq!(parse_value("8080", ItemKind::Plain), json!(8080));
        assert_eq!(parse_value("true", ItemKind::Plain), json!(true));
        assert_eq!(parse_value(r#"{"a":[1]}"#, ItemKind::Plain), json!({"a": [1]}));
        assert_eq!(parse_value(r#""quoted""#, ItemKind::Plain), json!("quoted"));
    }

    #[test]
    fn test_plain_non_json_falls_back_to_string() {
        assert_eq!(parse_value("eu-west-1", ItemKind::Plain), json!("eu-west-1"));
        assert_eq!(parse_value("", ItemKind::Plain), json!(""));
    }

    #[test]
    fn test_references_are_verbatim() {
        assert_eq!(parse_value("123", ItemKind::Secret), json!("123"));
        assert_eq!(parse_value("shared", ItemKind::Nested), json!("shared"));
    }

    #[test]
    fn test_build_item_uses_kind() {
        let args = ItemArgs {
            set: "app".to_string(),
            key: "db".to_string(),
            value: "db-password".to_string(),
            kind: ItemKind::Secret,
        };
        assert_eq!(
            build_item(&args).unwrap(),
            ConfigItem::secret("db", "db-password")
        );
    }
}
