use colored::Colorize;
use errors::ConfigError;

#[derive(Debug)]
pub struct UxError {
    pub what: String,
    pub why: Option<String>,
    pub how_to_fix: Vec<String>,
    pub suggested_command: Option<String>,
}

impl UxError {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: None,
            how_to_fix: Vec::new(),
            suggested_command: None,
        }
    }

    pub fn why(mut self, reason: impl Into<String>) -> Self {
        self.why = Some(reason.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.how_to_fix.push(suggestion.into());
        self
    }

    pub fn suggest(mut self, cmd: impl Into<String>) -> Self {
        self.suggested_command = Some(cmd.into());
        self
    }

    pub fn display(&self) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), self.what.white().bold());

        if let Some(why) = &self.why {
            eprintln!("       {}", why.dimmed());
        }

        if !self.how_to_fix.is_empty() {
            eprintln!();
            eprintln!("{}", "How to fix:".yellow().bold());
            for (i, fix) in self.how_to_fix.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, fix);
            }
        }

        if let Some(cmd) = &self.suggested_command {
            eprintln!();
            eprintln!("{}", "Try this:".green().bold());
            eprintln!("  $ {}", cmd.cyan());
        }
        eprintln!();
    }
}

impl std::fmt::Display for UxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl std::error::Error for UxError {}

impl From<ConfigError> for UxError {
    fn from(err: ConfigError) -> Self {
        let what = err.to_string();
        match err {
            ConfigError::ConfigNotExists { .. } => UxError::new(what)
                .why("No set is stored under this name")
                .fix("Check the spelling, set names are case sensitive")
                .suggest("olive names"),
            ConfigError::DuplicatedConfig { name } => UxError::new(what)
                .why("Set names are unique")
                .fix("Pick another name or delete the existing set first")
                .suggest(format!("olive show {}", name)),
            ConfigError::DuplicatedKey { key } => UxError::new(what)
                .why("Adding never overwrites an existing item")
                .fix("Use update to replace the item")
                .suggest(format!("olive update <SET> {} <VALUE>", key)),
            ConfigError::KeyNotExists { key } => UxError::new(what)
                .why("Only existing items can be updated or removed")
                .fix("Use add to create the item")
                .suggest(format!("olive add <SET> {} <VALUE>", key)),
            ConfigError::SecretNotExists { .. } => UxError::new(what)
                .why("A secret item references a name the secret provider does not know")
                .fix("Create the secret in the configured provider")
                .fix("Or point the item at an existing secret"),
            ConfigError::InvalidSecretValue { .. } | ConfigError::InvalidNestedValue { .. } => {
                UxError::new(what).why("Secret and nested items hold a name, which must be a string")
            }
            ConfigError::CyclicReference { path } => UxError::new(what)
                .why(format!("Resolution revisits a set: {}", path.join(" -> ")))
                .fix("Remove one of the nested items on the cycle"),
            ConfigError::Timeout { .. } => UxError::new(what)
                .why("A shared read did not finish within the collapse timeout")
                .fix("Retry the read")
                .fix("Or raise COLLAPSE_TIMEOUT_MS"),
            ConfigError::OldValue { .. } | ConfigError::Internal { .. } => UxError::new(what)
                .why("The store or one of its collaborators failed")
                .fix("Check that Redis and the secret provider are reachable"),
        }
    }
}

pub fn redis_unreachable(host: &str, port: u16, reason: &str) -> UxError {
    UxError::new(format!("Cannot connect to Redis at {}:{}", host, port))
        .why(reason.to_string())
        .fix("Start Redis or check the RD_HOST and RD_PORT variables")
        .fix("Check credentials in RD_USERNAME and RD_PASSWORD")
        .suggest("redis-cli -h <RD_HOST> -p <RD_PORT> ping")
}
