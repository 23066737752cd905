//! Attempt escalation for checked responses
//!
//! Bounded retry state machine: call the completion provider, red-flag check
//! the text, retry with a stricter prompt, and upgrade to the strong model on
//! the final attempt. Most defects are transient sampling noise, so the cheap
//! model gets the early retries and the expensive model is the last resort.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::WoodyConfig;
use crate::provider::{ChatMessage, CompletionError, CompletionProvider, CompletionRequest};

use super::classify::ClassificationTags;
use super::detect::{detect, DefectFlag, DetectorPolicy};
use super::prompt::PromptLibrary;
use super::PipelineError;

// ============================================================================
// Policy
// ============================================================================

/// Attempt budget and model ladder. All three fields are config-tunable.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    pub max_attempts: u32,
    pub default_model: String,
    pub escalation_model: String,
}

impl EscalationPolicy {
    pub fn from_config(config: &WoodyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            default_model: config.model.clone(),
            escalation_model: config.escalation_model.clone(),
        }
    }

    /// Cheap model for every attempt except the last, which escalates.
    pub fn model_for_attempt(&self, attempt: u32) -> &str {
        if self.max_attempts > 1 && attempt >= self.max_attempts {
            &self.escalation_model
        } else {
            &self.default_model
        }
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// Running attempt n (1-based)
    Attempting(u32),
    /// Attempt n passed every red-flag check
    Succeeded(u32),
    /// Budget spent without a clean attempt
    Exhausted,
}

fn next_state(attempt: u32, max_attempts: u32) -> EscalationState {
    if attempt < max_attempts {
        EscalationState::Attempting(attempt + 1)
    } else {
        EscalationState::Exhausted
    }
}

/// One completed attempt, immutable once recorded.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub index: u32,
    pub model: String,
    pub response_text: String,
    pub flags: BTreeSet<DefectFlag>,
    /// Transport-level failure, if the call itself failed
    pub failure: Option<String>,
}

impl Attempt {
    pub fn is_clean(&self) -> bool {
        self.failure.is_none() && self.flags.is_empty()
    }
}

/// The chosen response and which attempt produced it.
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub text: String,
    pub attempt_index: u32,
    pub flags: BTreeSet<DefectFlag>,
    pub attempts_used: u32,
}

// ============================================================================
// Controller
// ============================================================================

pub struct EscalationController<'a> {
    pub policy: &'a EscalationPolicy,
    pub library: &'a PromptLibrary,
    pub detector: &'a DetectorPolicy,
    pub max_tokens: u32,
}

impl EscalationController<'_> {
    /// Drive attempts strictly sequentially until the first clean response
    /// or budget exhaustion. Never issues more than `max_attempts` calls.
    ///
    /// A failed call consumes an attempt like a fully-flagged response would,
    /// so transport errors cannot cause unbounded retries. An error only
    /// propagates when no attempt ever produced text.
    pub async fn run(
        &self,
        provider: &dyn CompletionProvider,
        tags: &ClassificationTags,
        history: &[ChatMessage],
        user: ChatMessage,
    ) -> Result<EscalationOutcome, PipelineError> {
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut last_error: Option<CompletionError> = None;
        let mut state = EscalationState::Attempting(1);

        while let EscalationState::Attempting(n) = state {
            let model = self.policy.model_for_attempt(n).to_string();
            let system = self.library.assemble(tags, n);

            let mut messages = Vec::with_capacity(history.len() + 2);
            messages.push(ChatMessage::system(system));
            messages.extend_from_slice(history);
            messages.push(user.clone());

            let request = CompletionRequest {
                model: model.clone(),
                temperature: 0.0,
                max_tokens: self.max_tokens,
                messages,
            };

            match provider.complete(request).await {
                Ok(completion) => {
                    let flags = detect(&completion.text, tags, self.detector);
                    let clean = flags.is_empty();

                    if clean {
                        info!(attempt = n, model = %model, "attempt passed all red-flag checks");
                    } else {
                        let labels: Vec<String> = flags.iter().map(DefectFlag::label).collect();
                        warn!(attempt = n, model = %model, flags = ?labels, "attempt flagged");
                    }

                    attempts.push(Attempt {
                        index: n,
                        model,
                        response_text: completion.text,
                        flags,
                        failure: None,
                    });

                    state = if clean {
                        EscalationState::Succeeded(n)
                    } else {
                        next_state(n, self.policy.max_attempts)
                    };
                }
                Err(e) => {
                    warn!(attempt = n, model = %model, error = %e, "completion call failed, attempt consumed");
                    attempts.push(Attempt {
                        index: n,
                        model,
                        response_text: String::new(),
                        flags: BTreeSet::new(),
                        failure: Some(e.to_string()),
                    });
                    last_error = Some(e);
                    state = next_state(n, self.policy.max_attempts);
                }
            }
        }

        let attempts_used = attempts.len() as u32;

        if let (EscalationState::Succeeded(n), Some(winner)) = (state, attempts.last()) {
            return Ok(EscalationOutcome {
                text: winner.response_text.clone(),
                attempt_index: n,
                flags: BTreeSet::new(),
                attempts_used,
            });
        }

        // Exhausted: best effort - surface the last attempt that produced
        // text, flags and all. The user gets an answer, the logs keep the
        // defect record.
        if let Some(best) = attempts
            .iter()
            .rev()
            .find(|a| !a.response_text.trim().is_empty())
        {
            info!(
                attempt = best.index,
                attempts_used, "attempt budget exhausted, returning best-effort response"
            );
            return Ok(EscalationOutcome {
                text: best.response_text.clone(),
                attempt_index: best.index,
                flags: best.flags.clone(),
                attempts_used,
            });
        }

        match last_error {
            Some(e) => Err(PipelineError::Completion(e)),
            None => Err(PipelineError::NoUsableResponse),
        }
    }
}
