//! System-prompt assembly
//!
//! The prompt is data, not code: a base block, per-topic method cards, and a
//! strict-retry suffix live in a TOML document (embedded default, overridable
//! via config). Assembly is deterministic - the same (tags, attempt) pair
//! always produces byte-identical output.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

use super::classify::ClassificationTags;

/// Prompt configuration: base + method cards + retry suffix.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptLibrary {
    base: String,
    #[serde(default)]
    cards: Vec<MethodCard>,
    retry_suffix: String,
}

/// A topic-specific instruction block appended when its tag fires.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodCard {
    pub id: String,
    pub tag: CardTag,
    pub body: String,
}

/// Classification tag a card is keyed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardTag {
    TrigPowerIntegral,
    ExpTimesTrig,
    Series,
}

impl CardTag {
    fn applies(&self, tags: &ClassificationTags) -> bool {
        match self {
            CardTag::TrigPowerIntegral => tags.is_trig_power_integral,
            CardTag::ExpTimesTrig => tags.is_exp_times_trig,
            CardTag::Series => tags.is_series,
        }
    }
}

static EMBEDDED: Lazy<PromptLibrary> = Lazy::new(|| {
    toml::from_str(include_str!("prompts.toml")).expect("embedded prompt config is valid TOML")
});

impl PromptLibrary {
    /// The compiled-in default configuration.
    pub fn embedded() -> Self {
        EMBEDDED.clone()
    }

    /// Load from an override file when configured, else the embedded default.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading prompt config {}", path))?;
                let library: PromptLibrary = toml::from_str(&raw)
                    .with_context(|| format!("parsing prompt config {}", path))?;
                tracing::info!(path, cards = library.cards.len(), "loaded prompt config");
                Ok(library)
            }
            None => Ok(Self::embedded()),
        }
    }

    /// Compose the system prompt for one attempt.
    ///
    /// Cards are appended in declaration order regardless of which tags
    /// fired, so prompt content is stable and cache-friendly. The strict
    /// suffix is present only from the second attempt on.
    pub fn assemble(&self, tags: &ClassificationTags, attempt_index: u32) -> String {
        let mut prompt = String::with_capacity(self.base.len() + 1024);
        prompt.push_str(self.base.trim());

        for card in &self.cards {
            if card.tag.applies(tags) {
                prompt.push_str("\n\n");
                prompt.push_str(card.body.trim());
            }
        }

        if attempt_index > 1 {
            prompt.push_str("\n\n");
            prompt.push_str(self.retry_suffix.trim());
        }

        prompt
    }

    pub fn cards(&self) -> &[MethodCard] {
        &self.cards
    }
}
