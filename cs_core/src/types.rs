use chrono::{DateTime, Utc};
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use strum::{Display, EnumString};

/// How an item's value is turned into output during flattening.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Plain,
    Secret,
    Nested,
}

/// Value of a config item, tagged by how it resolves.
///
/// Secret and nested references are plain names; the string-typed
/// requirement is enforced when the item is built, not when it is
/// flattened.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Plain(serde_json::Value),
    SecretRef(String),
    NestedRef(String),
}

impl ItemValue {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemValue::Plain(_) => ItemKind::Plain,
            ItemValue::SecretRef(_) => ItemKind::Secret,
            ItemValue::NestedRef(_) => ItemKind::Nested,
        }
    }

    /// The raw JSON value as stored and sent over the wire.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ItemValue::Plain(v) => v.clone(),
            ItemValue::SecretRef(name) | ItemValue::NestedRef(name) => {
                serde_json::Value::String(name.clone())
            }
        }
    }
}

/// One key/value/kind triple inside a [`ConfigSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfigItem", into = "RawConfigItem")]
pub struct ConfigItem {
    pub key: String,
    pub value: ItemValue,
}

impl ConfigItem {
    /// Builds an item from an untyped value, rejecting non-string secret and
    /// nested references.
    pub fn new(
        key: impl Into<String>,
        value: serde_json::Value,
        kind: ItemKind,
    ) -> Result<Self, ConfigError> {
        let key = key.into();
        let value = match (kind, value) {
            (ItemKind::Plain, value) => ItemValue::Plain(value),
            (ItemKind::Secret, serde_json::Value::String(name)) => ItemValue::SecretRef(name),
            (ItemKind::Secret, _) => return Err(ConfigError::InvalidSecretValue { key }),
            (ItemKind::Nested, serde_json::Value::String(name)) => ItemValue::NestedRef(name),
            (ItemKind::Nested, _) => return Err(ConfigError::InvalidNestedValue { key }),
        };
        Ok(Self { key, value })
    }

    pub fn plain(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: ItemValue::Plain(value.into()),
        }
    }

    pub fn secret(key: impl Into<String>, secret_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ItemValue::SecretRef(secret_name.into()),
        }
    }

    pub fn nested(key: impl Into<String>, set_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ItemValue::NestedRef(set_name.into()),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.value.kind()
    }
}

#[derive(Serialize, Deserialize)]
struct RawConfigItem {
    key: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(rename = "type", default)]
    kind: ItemKind,
}

impl TryFrom<RawConfigItem> for ConfigItem {
    type Error = ConfigError;

    fn try_from(raw: RawConfigItem) -> Result<Self, Self::Error> {
        ConfigItem::new(raw.key, raw.value, raw.kind)
    }
}

impl From<ConfigItem> for RawConfigItem {
    fn from(item: ConfigItem) -> Self {
        RawConfigItem {
            kind: item.kind(),
            value: item.value.to_json(),
            key: item.key,
        }
    }
}

/// A named, mutable collection of config items.
///
/// Items are kept ordered by key so a serialized set is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSet {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: BTreeMap<String, ConfigItem>,
}

impl ConfigSet {
    /// An empty set whose creation and update times are both `now`.
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created_at: now,
            updated_at: now,
            items: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, item: ConfigItem) -> Result<(), ConfigError> {
        if self.items.contains_key(&item.key) {
            return Err(ConfigError::DuplicatedKey { key: item.key });
        }
        self.items.insert(item.key.clone(), item);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&ConfigItem, ConfigError> {
        self.items.get(key).ok_or_else(|| ConfigError::KeyNotExists {
            key: key.to_string(),
        })
    }

    /// Replaces an existing item, returning the previous one.
    pub fn update(&mut self, item: ConfigItem) -> Result<ConfigItem, ConfigError> {
        match self.items.get_mut(&item.key) {
            Some(slot) => Ok(std::mem::replace(slot, item)),
            None => Err(ConfigError::KeyNotExists { key: item.key }),
        }
    }

    pub fn remove(&mut self, key: &str) -> Result<ConfigItem, ConfigError> {
        self.items
            .remove(key)
            .ok_or_else(|| ConfigError::KeyNotExists {
                key: key.to_string(),
            })
    }

    /// Records a mutation. `updated_at` strictly increases, so it only equals
    /// `created_at` for a set that was never mutated.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + chrono::Duration::microseconds(1);
        self.updated_at = now.max(floor);
    }

    /// The same set under a new name, with the rename recorded as a mutation.
    pub fn renamed(mut self, new_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.name = new_name.into();
        self.touch(now);
        self
    }
}

/// A stored feature flag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToggleFlag {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToggleFlag {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn with_status(status: bool) -> Self {
        Self { status, data: None }
    }
}

/// Expiration horizon of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ttl {
    #[default]
    Infinite,
    Expires(Duration),
}

impl Ttl {
    pub fn from_seconds(seconds: Option<u64>) -> Self {
        match seconds {
            Some(s) => Ttl::Expires(Duration::from_secs(s)),
            None => Ttl::Infinite,
        }
    }
}

/// Staleness budget a reader accepts for a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaxAge {
    #[default]
    Any,
    Within(Duration),
}

impl MaxAge {
    pub fn from_millis(millis: Option<u64>) -> Self {
        match millis {
            Some(ms) => MaxAge::Within(Duration::from_millis(ms)),
            None => MaxAge::Any,
        }
    }

    /// Whether an entry written at `written_at` is too old to serve at `now`.
    pub fn is_stale(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            MaxAge::Any => false,
            MaxAge::Within(budget) => match chrono::Duration::from_std(*budget) {
                Ok(budget) => written_at + budget < now,
                Err(_) => false,
            },
        }
    }
}

impl std::fmt::Display for MaxAge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxAge::Any => write!(f, "any"),
            MaxAge::Within(d) => write!(f, "{}ms", d.as_millis()),
        }
    }
}
