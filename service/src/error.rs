use cs_core::ConfigSet;
use errors::ConfigError;
use thiserror::Error;

/// Failed item mutation. For `DuplicatedKey` and `KeyNotExists` the
/// unmodified set is attached so callers can inspect it without another
/// read.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct ItemMutationError {
    pub error: ConfigError,
    pub current: Option<ConfigSet>,
}

impl ItemMutationError {
    pub fn new(error: ConfigError) -> Self {
        Self {
            error,
            current: None,
        }
    }

    pub fn with_current(error: ConfigError, current: ConfigSet) -> Self {
        Self {
            error,
            current: Some(current),
        }
    }
}

impl From<ItemMutationError> for ConfigError {
    fn from(err: ItemMutationError) -> Self {
        err.error
    }
}
