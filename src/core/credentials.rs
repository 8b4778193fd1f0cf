//! API credential and model selection, as stored by the settings page

use crate::config::Settings;
use crate::error::StoreResult;
use crate::storage::{keys, KeyValueStore, StoreMap};
use anyhow::{bail, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub api_key: String,
    pub model: String,
}

impl Credentials {
    /// Read the stored key and model
    /// An empty stored key falls back to `OPENAI_API_KEY`; a missing model to `default_model`
    pub async fn load(store: &dyn KeyValueStore, default_model: &str) -> StoreResult<Self> {
        let values = store.get(&[keys::API_KEY, keys::MODEL]).await?;

        let api_key = string_value(&values, keys::API_KEY)
            .or_else(Settings::api_key_from_env)
            .unwrap_or_default();
        let model = string_value(&values, keys::MODEL).unwrap_or_else(|| default_model.to_string());

        Ok(Self { api_key, model })
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn save(store: &dyn KeyValueStore, api_key: &str, model: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("Please enter an API key");
        }

        let mut items = StoreMap::new();
        items.insert(keys::API_KEY.to_string(), Value::String(api_key.to_string()));
        items.insert(keys::MODEL.to_string(), Value::String(model.trim().to_string()));
        store.set(items).await?;

        tracing::info!("Settings saved (model: {})", model);
        Ok(())
    }
}

fn string_value(values: &StoreMap, key: &str) -> Option<String> {
    values
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
