use std::num::NonZeroU32;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::util::Client;
use crate::job::reconcile::MenuEntry;

/// Content tags the classifier is asked about, one yes/no question each.
pub static CONTENT_TAGS: [&str; 4] = ["fish", "pork", "meat", "chicken"];

static CHAT_MODEL: &str = "gpt-4o-mini";
static IMAGE_MODEL: &str = "dall-e-3";

/// Enrichment calls per second towards the generative API.
static ENRICH_RPS: NonZeroU32 = NonZeroU32::new(5).unwrap();

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub base_url: String,
    pub api_key: String,
}

pub struct EnrichClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: String,
}

impl EnrichClient {
    pub fn new(config: &EnrichmentConfig) -> Self {
        EnrichClient {
            // The generative API is the one collaborator worth rate limiting.
            client: Client::new()
                .with_limit(ENRICH_RPS)
                .with_bearer(&config.api_key),
            base_url: config.base_url.clone(),
        }
    }

    async fn dish_contains(&self, dish: &str, category: &str) -> Result<bool> {
        let response: ChatResponse = self
            .client
            .post_json(
                format!("{}/v1/chat/completions", self.base_url),
                serde_json::json!({
                    "model": CHAT_MODEL,
                    "messages": [
                        {
                            "role": "system",
                            "content": "You classify cafeteria dishes. Answer with a single word: yes or no."
                        },
                        {
                            "role": "user",
                            "content": format!("Does the dish \"{dish}\" contain {category}?")
                        }
                    ]
                }),
            )
            .await?;
        let answer = response
            .choices
            .into_iter()
            .next()
            .context("classification response had no choices")?
            .message
            .content;
        Ok(answer.trim().to_lowercase().starts_with("yes"))
    }

    /// Tags the dish against every category in [`CONTENT_TAGS`]. An empty
    /// result still counts as classified.
    pub async fn classify_contents(&self, dish: &str) -> Result<Vec<String>> {
        let mut tags = vec![];
        for category in CONTENT_TAGS {
            if self.dish_contains(dish, category).await? {
                tags.push(category.to_string());
            }
        }
        Ok(tags)
    }

    pub async fn generate_image(&self, dish: &str) -> Result<String> {
        let response: ImageResponse = self
            .client
            .post_json(
                format!("{}/v1/images/generations", self.base_url),
                serde_json::json!({
                    "model": IMAGE_MODEL,
                    "prompt": format!("A photo of the cafeteria dish \"{dish}\", served on a plate"),
                    "n": 1,
                    "size": "1024x1024"
                }),
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .next()
            .context("image response had no data")?
            .url)
    }
}

/// Fills in unset enrichment fields across the collection. Entries whose
/// fields are already set are never re-queried, so the pass stays idempotent
/// and each external call is paid at most once per entry. Per-entry failures
/// are logged and left for the next cycle.
///
/// Returns whether anything changed, so the caller knows to rewrite.
pub async fn enrich_entries(entries: &mut [MenuEntry], client: &EnrichClient) -> bool {
    let mut changed = false;
    for entry in entries.iter_mut() {
        if entry.food_contents.is_none() {
            match client.classify_contents(&entry.food_name).await {
                Ok(tags) => {
                    info!(dish = %entry.food_name, ?tags, "classified dish contents");
                    entry.food_contents = Some(tags);
                    changed = true;
                }
                Err(err) => {
                    warn!(dish = %entry.food_name, error = ?err, "content classification failed")
                }
            }
        }
        if entry.image.is_none() {
            match client.generate_image(&entry.food_name).await {
                Ok(url) => {
                    entry.image = Some(url);
                    changed = true;
                }
                Err(err) => {
                    warn!(dish = %entry.food_name, error = ?err, "image generation failed")
                }
            }
        }
    }
    changed
}
