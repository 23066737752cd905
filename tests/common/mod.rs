// tests/common/mod.rs
// Shared stub completion provider for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use woody::provider::{
    Completion, CompletionError, CompletionProvider, CompletionRequest, StreamEvent,
};

/// What the stub should do on one call
pub enum Scripted {
    Reply(&'static str),
    Fail,
}

/// Deterministic provider: plays back a script and records every request.
pub struct StubProvider {
    script: Mutex<Vec<Scripted>>,
    pub calls: Mutex<Vec<CompletionRequest>>,
}

impl StubProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Stub that always answers with the same text, forever.
    pub fn always(reply: &'static str) -> Self {
        let mut script = Vec::new();
        for _ in 0..16 {
            script.push(Scripted::Reply(reply));
        }
        Self::new(script)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.messages.first())
            .filter_map(|m| match &m.content {
                woody::provider::MessageContent::Text(t) => Some(t.clone()),
                woody::provider::MessageContent::Parts(_) => None,
            })
            .collect()
    }

    fn next(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        self.calls.lock().unwrap().push(request.clone());
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            panic!("stub provider script exhausted");
        }
        match script.remove(0) {
            Scripted::Reply(text) => Ok(Completion {
                text: text.to_string(),
                usage: None,
            }),
            Scripted::Fail => Err(CompletionError::Api {
                status: 503,
                body: "upstream unavailable".into(),
            }),
        }
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        self.next(&request)
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, CompletionError> {
        let completion = self.next(&request)?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            // Two deltas so callers exercise reassembly
            let mid = completion.text.len() / 2;
            let (a, b) = completion.text.split_at(mid);
            let _ = tx.send(StreamEvent::TextDelta(a.to_string())).await;
            let _ = tx.send(StreamEvent::TextDelta(b.to_string())).await;
            let _ = tx.send(StreamEvent::Done).await;
        });
        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Pipeline wired with the default policy against the given stub.
pub fn test_pipeline(max_attempts: u32) -> woody::pipeline::ChatPipeline {
    woody::pipeline::ChatPipeline::new(
        woody::pipeline::EscalationPolicy {
            max_attempts,
            default_model: "cheap-model".into(),
            escalation_model: "strong-model".into(),
        },
        woody::pipeline::DetectorPolicy::default(),
        woody::pipeline::PromptLibrary::embedded(),
        2048,
    )
}
