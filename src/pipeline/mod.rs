//! Response-verification pipeline
//!
//! classify -> assemble prompt -> complete -> red-flag check -> retry/escalate.
//!
//! Questions that look like integrals or series go through the checked,
//! buffered route (detection needs complete text); everything else takes a
//! single unchecked call that may stream straight to the caller.

pub mod classify;
pub mod detect;
pub mod escalation;
pub mod prompt;

pub use classify::{classify, ClassificationTags};
pub use detect::{detect, DefectFlag, DetectorPolicy};
pub use escalation::{
    Attempt, EscalationController, EscalationOutcome, EscalationPolicy, EscalationState,
};
pub use prompt::PromptLibrary;

use std::collections::BTreeSet;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::config::WoodyConfig;
use crate::ingest::normalize_math_text;
use crate::provider::{
    ChatMessage, CompletionError, CompletionProvider, CompletionRequest, StreamEvent,
};

/// Pipeline-level failures. Quality defects never appear here - they are
/// recovered by retry/escalation and only influence which text is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("model produced no usable response text")]
    NoUsableResponse,
}

/// The final text chosen for one request.
#[derive(Debug, Clone)]
pub struct PipelineReply {
    pub text: String,
    /// Whether the checked (red-flag verified) route produced this text
    pub verified: bool,
    pub attempt_index: u32,
    /// Defects still present in the returned text (log-only, never user-facing)
    pub flags: BTreeSet<DefectFlag>,
}

/// One fully-configured pipeline instance, shared across requests.
pub struct ChatPipeline {
    policy: EscalationPolicy,
    detector: DetectorPolicy,
    library: PromptLibrary,
    max_tokens: u32,
}

impl ChatPipeline {
    pub fn new(
        policy: EscalationPolicy,
        detector: DetectorPolicy,
        library: PromptLibrary,
        max_tokens: u32,
    ) -> Self {
        Self {
            policy,
            detector,
            library,
            max_tokens,
        }
    }

    pub fn from_config(config: &WoodyConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            EscalationPolicy::from_config(config),
            DetectorPolicy::default(),
            PromptLibrary::load(config.prompt_config_path.as_deref())?,
            config.max_output_tokens,
        ))
    }

    /// Normalize the raw question and derive its tags.
    pub fn classify_question(&self, text: &str) -> (String, ClassificationTags) {
        let normalized = normalize_math_text(text);
        let tags = classify(&normalized);
        (normalized, tags)
    }

    /// Produce the final answer text for a question, routing through the
    /// checked pipeline when the classifier demands verification.
    pub async fn answer(
        &self,
        provider: &dyn CompletionProvider,
        text: &str,
        image_urls: &[String],
        history: &[ChatMessage],
    ) -> Result<PipelineReply, PipelineError> {
        let request_id = Uuid::new_v4();
        let (normalized, tags) = self.classify_question(text);
        info!(%request_id, tags = ?tags.fired(), images = image_urls.len(), "answering question");

        if tags.requires_verification {
            self.answer_checked(provider, &normalized, &tags, image_urls, history)
                .await
        } else {
            let user = ChatMessage::user_with_images(normalized, image_urls);
            let completion = provider
                .complete(self.build_request(&tags, 1, history, user))
                .await?;
            Ok(PipelineReply {
                text: completion.text,
                verified: false,
                attempt_index: 1,
                flags: BTreeSet::new(),
            })
        }
    }

    /// Run the full verify-and-escalate loop for an already-classified question.
    pub async fn answer_checked(
        &self,
        provider: &dyn CompletionProvider,
        normalized: &str,
        tags: &ClassificationTags,
        image_urls: &[String],
        history: &[ChatMessage],
    ) -> Result<PipelineReply, PipelineError> {
        let controller = EscalationController {
            policy: &self.policy,
            library: &self.library,
            detector: &self.detector,
            max_tokens: self.max_tokens,
        };
        let user = ChatMessage::user_with_images(normalized, image_urls);
        let outcome = controller.run(provider, tags, history, user).await?;

        Ok(PipelineReply {
            text: outcome.text,
            verified: true,
            attempt_index: outcome.attempt_index,
            flags: outcome.flags,
        })
    }

    /// Open an unchecked streaming completion for the fast path. Callers must
    /// only use this when `tags.requires_verification` is false - a verified
    /// attempt cannot be streamed live, detection needs the whole text.
    pub async fn open_stream(
        &self,
        provider: &dyn CompletionProvider,
        normalized: &str,
        tags: &ClassificationTags,
        image_urls: &[String],
        history: &[ChatMessage],
    ) -> Result<mpsc::Receiver<StreamEvent>, PipelineError> {
        let user = ChatMessage::user_with_images(normalized, image_urls);
        let rx = provider
            .complete_stream(self.build_request(tags, 1, history, user))
            .await?;
        Ok(rx)
    }

    fn build_request(
        &self,
        tags: &ClassificationTags,
        attempt_index: u32,
        history: &[ChatMessage],
        user: ChatMessage,
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.library.assemble(tags, attempt_index)));
        messages.extend_from_slice(history);
        messages.push(user);

        CompletionRequest {
            model: self.policy.model_for_attempt(attempt_index).to_string(),
            temperature: 0.0,
            max_tokens: self.max_tokens,
            messages,
        }
    }
}
