//! Optional description enrichment.
//!
//! Extraction always produces heuristic descriptions. When a completion provider is
//! configured and a [`CompletionClient`] is supplied, the [`Enricher`] asks it for better
//! endpoint descriptions and for field help text the source left out. Any failure keeps the
//! heuristic text.

use crate::analyzer::AppAnalysis;
use crate::config::{AiConfig, AiProvider};
use crate::extractor::{EndpointDescriptor, FieldDescriptor};
use anyhow::Result;
use log::{debug, warn};
use std::time::Duration;

/// Blocking text completion. Implementations own the transport and the credentials.
pub trait CompletionClient {
    /// Completes `prompt`, giving up after `timeout`.
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

/// Rewrites descriptions of an analyzed application through a [`CompletionClient`].
pub struct Enricher<'a> {
    provider: AiProvider,
    model: String,
    timeout: Duration,
    client: Option<&'a dyn CompletionClient>,
}

impl<'a> Enricher<'a> {
    pub fn new(config: &AiConfig, client: Option<&'a dyn CompletionClient>) -> Self {
        Self {
            provider: config.provider,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            client,
        }
    }

    /// Whether enrichment will call out at all.
    pub fn is_active(&self) -> bool {
        self.provider != AiProvider::Local && self.client.is_some()
    }

    /// Enriches endpoint descriptions and missing serializer help text in place.
    ///
    /// Returns the number of texts that were replaced.
    pub fn enrich_app(&self, app: &mut AppAnalysis) -> usize {
        if !self.is_active() {
            return 0;
        }
        debug!(
            "Enriching application '{}' with {:?} ({})",
            app.name, self.provider, self.model
        );

        let mut replaced = 0;
        for endpoint in &mut app.endpoints {
            if let Some(text) = self.ask(&endpoint_prompt(endpoint)) {
                endpoint.description = text;
                replaced += 1;
            }
        }
        for serializer in &mut app.serializers {
            let class_name = serializer.class.name.clone();
            for field in serializer
                .fields
                .iter_mut()
                .filter(|field| field.help_text.is_none())
            {
                if let Some(text) = self.ask(&field_prompt(&class_name, field)) {
                    field.help_text = Some(text);
                    replaced += 1;
                }
            }
        }
        replaced
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        let client = self.client?;
        match client.complete(prompt, self.timeout) {
            Ok(answer) => {
                let text = clean_answer(&answer);
                if text.is_empty() {
                    warn!("Empty completion, keeping heuristic text");
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!("Completion failed, keeping heuristic text: {:#}", e);
                None
            }
        }
    }
}

fn endpoint_prompt(endpoint: &EndpointDescriptor) -> String {
    let mut prompt = format!(
        "Describe in one sentence what the Django REST Framework endpoint {} {} does. \
         It is handled by {}.{}.",
        endpoint.http_method, endpoint.path, endpoint.handler_class, endpoint.handler_function
    );
    if let Some(serializer) = &endpoint.serializer_class {
        prompt.push_str(&format!(" It uses the serializer {}.", serializer));
    }
    prompt.push_str(&format!(" Current description: {}", endpoint.description));
    prompt
}

fn field_prompt(class_name: &str, field: &FieldDescriptor) -> String {
    format!(
        "Write a one-sentence help text for the field '{}' of type {} in the serializer {}.",
        field.name, field.semantic_type, class_name
    )
}

/// First non-empty line of an answer, without surrounding quotes.
fn clean_answer(answer: &str) -> String {
    answer
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}
