use colored::Colorize;
use serde::Serialize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn hint(msg: &str) {
    println!("{} {}", "hint:".cyan().bold(), msg.dimmed());
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolved set JSON as stored in the cache, optionally re-indented.
pub fn resolved(bytes: &[u8], pretty: bool) -> serde_json::Result<()> {
    if pretty {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        json(&value)
    } else {
        println!("{}", String::from_utf8_lossy(bytes));
        Ok(())
    }
}

pub fn on_off(status: bool) -> String {
    if status {
        "on".green().bold().to_string()
    } else {
        "off".red().bold().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_helpers_do_not_panic() {
        header("olive");
        hint("a hint");
        info("some info");
        warn("a warning");
        error("an error");
        success("done");
    }

    #[test]
    fn test_resolved_pretty_rejects_invalid_json() {
        assert!(resolved(b"{not json", true).is_err());
        assert!(resolved(b"{not json", false).is_ok());
        assert!(resolved(br#"{"a":1}"#, true).is_ok());
    }

    #[test]
    fn test_on_off_wording() {
        colored::control::set_override(false);
        assert_eq!(on_off(true), "on");
        assert_eq!(on_off(false), "off");
    }
}
