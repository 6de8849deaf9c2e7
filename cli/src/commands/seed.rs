use anyhow::Result;
use clap::Args;
use cs_core::ConfigItem;
use errors::ConfigError;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::info;

use crate::app::App;
use crate::output;
use crate::ux_error::UxError;

const MAX_STRING_LEN: usize = 1024;

#[derive(Args)]
pub struct SeedArgs {
    #[arg(long, default_value_t = 10, help = "Number of sets to create")]
    pub sets: usize,

    #[arg(
        long,
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Upper bound of items per set"
    )]
    pub max_items: u32,

    #[arg(long, default_value = "sample", help = "Prefix of the generated set names")]
    pub prefix: String,
}

pub async fn run(app: &App, args: SeedArgs) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let mut created = 0;

    for n in 0..args.sets {
        let name = format!("{}{}", args.prefix, n);
        match app.service.create_set(&name).await {
            Ok(_) => created += 1,
            Err(ConfigError::DuplicatedConfig { .. }) => {
                output::warn(&format!("{} already exists, adding items to it", name));
            }
            Err(e) => return Err(UxError::from(e).into()),
        }

        let items = rng.gen_range(1..=args.max_items);
        for key in 0..items {
            let item = ConfigItem::plain(format!("key{}", key), random_value(&mut rng));
            if let Err(e) = app.service.add_item(item, &name).await {
                output::warn(&format!("{}: {}", name, e));
            }
        }
        info!(set = %name, items, "Seeded set");
    }

    output::success(&format!("Seeded {} new sets", created));
    Ok(())
}

/// A random number, boolean or alphanumeric string.
pub(crate) fn random_value<R: Rng>(rng: &mut R) -> Value {
    match rng.gen_range(0..3) {
        0 => Value::from(rng.gen_range(0..=i64::MAX)),
        1 => Value::Bool(rng.gen_bool(0.5)),
        _ => {
            let len = rng.gen_range(0..MAX_STRING_LEN);
            Value::String(random_string(rng, len))
        }
    }
}

fn random_string<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_values_are_plain_scalars() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            match random_value(&mut rng) {
                Value::Number(n) => assert!(n.as_i64().is_some_and(|v| v >= 0)),
                Value::Bool(_) => {}
                Value::String(s) => {
                    assert!(s.len() < MAX_STRING_LEN);
                    assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
                }
                other => panic!("unexpected value {other}"),
            }
        }
    }

    #[test]
    fn test_random_values_cover_every_type() {
        let mut rng = StdRng::seed_from_u64(42);
        let values: Vec<Value> = (0..300).map(|_| random_value(&mut rng)).collect();
        assert!(values.iter().any(Value::is_number));
        assert!(values.iter().any(Value::is_boolean));
        assert!(values.iter().any(Value::is_string));
    }

    #[test]
    fn test_random_string_length() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(random_string(&mut rng, 0), "");
        assert_eq!(random_string(&mut rng, 64).len(), 64);
    }
}
