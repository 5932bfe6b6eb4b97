//! Model catalog: list the models a detected backend serves, normalized to id / size / family.

use std::time::Duration;

use serde::Serialize;

use super::detect::BackendFlavor;
use crate::llm::{OllamaClient, OpenAiCompatClient, RemoteModel};

/// Name fragments used to label a model's family. Checked in order; first match wins.
const FAMILY_VOCAB: &[&str] = &[
    "deepseek", "qwen", "gemma", "mixtral", "mistral", "llava", "llama", "phi", "granite",
    "starcoder", "command", "claude", "gpt",
];

/// A model as presented to callers. `family` is a best-effort label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub human_size: Option<String>,
    pub family: Option<String>,
}

/// Lists models for a base URL + flavor. Failures yield an empty list.
#[derive(Clone)]
pub struct ModelCatalog {
    api_key: Option<String>,
    timeout: Duration,
}

impl ModelCatalog {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self { api_key, timeout }
    }

    pub async fn list_models(&self, base_url: &str, flavor: BackendFlavor) -> Vec<ModelInfo> {
        let listed = match flavor {
            BackendFlavor::Ollama => OllamaClient::new(base_url)
                .with_timeout(self.timeout)
                .list_models()
                .await
                .map(|models| {
                    models
                        .into_iter()
                        .map(|m| RemoteModel {
                            id: m.name,
                            size: m.size,
                            family: m.details.and_then(|d| d.family),
                        })
                        .collect::<Vec<_>>()
                }),
            BackendFlavor::Hosted(_) | BackendFlavor::OpenAiCompatible => {
                OpenAiCompatClient::new(base_url, self.api_key.clone())
                    .with_timeout(self.timeout)
                    .list_models()
                    .await
            }
        };
        match listed {
            Ok(models) => models.into_iter().map(normalize).collect(),
            Err(e) => {
                log::warn!("catalog: listing models at {} failed: {}", base_url, e);
                Vec::new()
            }
        }
    }
}

fn normalize(m: RemoteModel) -> ModelInfo {
    let family = m
        .family
        .as_deref()
        .and_then(infer_family)
        .or_else(|| infer_family(&m.id))
        .map(str::to_string);
    ModelInfo {
        human_size: m.size.map(human_size),
        family,
        id: m.id,
    }
}

/// Family label by substring match against the fixed vocabulary.
pub fn infer_family(name: &str) -> Option<&'static str> {
    let name = name.to_ascii_lowercase();
    FAMILY_VOCAB.iter().copied().find(|f| name.contains(f))
}

/// Decimal units, one fractional digit above bytes ("4.7 GB").
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
