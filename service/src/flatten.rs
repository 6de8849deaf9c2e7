//! Recursive resolution of a config set into a flat JSON object.
//!
//! Plain items are copied verbatim, secret items are replaced by the secret
//! plaintext and nested items by the flattened referenced set. Nested sets
//! are always read from the store, never from the JSON cache.

use cs_core::{ConfigSet, ConfigStore, ItemValue, SecretProvider};
use errors::ConfigError;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

pub struct Flattener<'a> {
    store: &'a dyn ConfigStore,
    secrets: &'a dyn SecretProvider,
}

impl<'a> Flattener<'a> {
    pub fn new(store: &'a dyn ConfigStore, secrets: &'a dyn SecretProvider) -> Self {
        Self { store, secrets }
    }

    /// Flattens `set`. Fails with the first error met; a set that reaches
    /// itself again through nested items fails with `CyclicReference`.
    pub async fn flatten(&self, set: &ConfigSet) -> Result<Map<String, Value>, ConfigError> {
        let mut resolving = vec![set.name.clone()];
        self.flatten_set(set, &mut resolving).await
    }

    // `resolving` holds the chain of set names from the root to `set`. Only
    // that chain is checked, so two items nesting the same set are fine.
    fn flatten_set<'b>(
        &'b self,
        set: &'b ConfigSet,
        resolving: &'b mut Vec<String>,
    ) -> BoxFuture<'b, Result<Map<String, Value>, ConfigError>> {
        Box::pin(async move {
            let mut output = Map::new();

            for (key, item) in &set.items {
                let value = match &item.value {
                    ItemValue::Plain(value) => value.clone(),
                    ItemValue::SecretRef(secret_name) => {
                        Value::String(self.secrets.get_secret(secret_name).await?)
                    }
                    ItemValue::NestedRef(nested_name) => {
                        if resolving.iter().any(|name| name == nested_name) {
                            let mut path = resolving.clone();
                            path.push(nested_name.clone());
                            return Err(ConfigError::CyclicReference { path });
                        }

                        let nested = self.store.get_set(nested_name).await?;
                        resolving.push(nested_name.clone());
                        let flattened = self.flatten_set(&nested, resolving).await;
                        resolving.pop();
                        Value::Object(flattened?)
                    }
                };
                output.insert(key.clone(), value);
            }

            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cs_core::ConfigItem;
    use serde_json::json;
    use storage::{InMemoryStore, LocalSecretProvider};

    async fn put(store: &InMemoryStore, name: &str, items: Vec<ConfigItem>) {
        store.create_set(ConfigSet::new(name, Utc::now())).await.unwrap();
        for item in items {
            store.add_item(item, name).await.unwrap();
        }
    }

    fn secrets() -> LocalSecretProvider {
        [("secretName", "hello")].into_iter().collect()
    }

    #[tokio::test]
    async fn test_plain_items_pass_through() {
        let store = InMemoryStore::new();
        put(
            &store,
            "s",
            vec![
                ConfigItem::plain("x", 1),
                ConfigItem::plain("list", json!([1, "two", null])),
                ConfigItem::plain("obj", json!({"deep": true})),
            ],
        )
        .await;
        let secrets = secrets();
        let set = store.get_set("s").await.unwrap();

        let flat = Flattener::new(&store, &secrets).flatten(&set).await.unwrap();
        assert_eq!(
            Value::Object(flat),
            json!({"x": 1, "list": [1, "two", null], "obj": {"deep": true}})
        );
    }

    #[tokio::test]
    async fn test_secret_and_nested_resolution() {
        let store = InMemoryStore::new();
        put(&store, "B", vec![ConfigItem::plain("a", 1)]).await;
        put(
            &store,
            "A",
            vec![ConfigItem::nested("n", "B"), ConfigItem::secret("p", "secretName")],
        )
        .await;
        let secrets = secrets();
        let set = store.get_set("A").await.unwrap();

        let flat = Flattener::new(&store, &secrets).flatten(&set).await.unwrap();
        assert_eq!(Value::Object(flat), json!({"n": {"a": 1}, "p": "hello"}));
    }

    #[tokio::test]
    async fn test_missing_secret_aborts() {
        let store = InMemoryStore::new();
        put(&store, "s", vec![ConfigItem::secret("p", "nope")]).await;
        let secrets = secrets();
        let set = store.get_set("s").await.unwrap();

        let err = Flattener::new(&store, &secrets).flatten(&set).await.unwrap_err();
        assert_eq!(
            err,
            ConfigError::SecretNotExists {
                name: "nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_nested_set_aborts() {
        let store = InMemoryStore::new();
        put(&store, "s", vec![ConfigItem::nested("n", "ghost")]).await;
        let secrets = secrets();
        let set = store.get_set("s").await.unwrap();

        let err = Flattener::new(&store, &secrets).flatten(&set).await.unwrap_err();
        assert_eq!(
            err,
            ConfigError::ConfigNotExists {
                name: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_direct_self_reference_is_cyclic() {
        let store = InMemoryStore::new();
        put(&store, "self", vec![ConfigItem::nested("me", "self")]).await;
        let secrets = secrets();
        let set = store.get_set("self").await.unwrap();

        let err = Flattener::new(&store, &secrets).flatten(&set).await.unwrap_err();
        assert_eq!(
            err,
            ConfigError::CyclicReference {
                path: vec!["self".to_string(), "self".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_transitive_cycle_reports_chain() {
        let store = InMemoryStore::new();
        put(&store, "a", vec![ConfigItem::nested("b", "b")]).await;
        put(&store, "b", vec![ConfigItem::nested("c", "c")]).await;
        put(&store, "c", vec![ConfigItem::nested("a", "a")]).await;
        let secrets = secrets();
        let set = store.get_set("a").await.unwrap();

        let err = Flattener::new(&store, &secrets).flatten(&set).await.unwrap_err();
        assert_eq!(
            err,
            ConfigError::CyclicReference {
                path: vec!["a", "b", "c", "a"].into_iter().map(String::from).collect()
            }
        );
    }

    #[tokio::test]
    async fn test_diamond_is_not_a_cycle() {
        let store = InMemoryStore::new();
        put(&store, "shared", vec![ConfigItem::plain("v", true)]).await;
        put(
            &store,
            "root",
            vec![
                ConfigItem::nested("left", "shared"),
                ConfigItem::nested("right", "shared"),
            ],
        )
        .await;
        let secrets = secrets();
        let set = store.get_set("root").await.unwrap();

        let flat = Flattener::new(&store, &secrets).flatten(&set).await.unwrap();
        assert_eq!(
            Value::Object(flat),
            json!({"left": {"v": true}, "right": {"v": true}})
        );
    }

    #[tokio::test]
    async fn test_flatten_is_idempotent() {
        let store = InMemoryStore::new();
        put(&store, "B", vec![ConfigItem::plain("a", 1)]).await;
        put(
            &store,
            "A",
            vec![ConfigItem::nested("n", "B"), ConfigItem::plain("z", "last")],
        )
        .await;
        let secrets = secrets();
        let set = store.get_set("A").await.unwrap();
        let flattener = Flattener::new(&store, &secrets);

        let first = serde_json::to_vec(&flattener.flatten(&set).await.unwrap()).unwrap();
        let second = serde_json::to_vec(&flattener.flatten(&set).await.unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
