//! Scripted in-process client for offline runs and tests.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use cyclecare_core::{AppError, AppResult, ServiceFailure};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the mock answers with.
#[derive(Debug, Clone)]
enum Reply {
    Fixed(String),
    Echo,
}

/// An `LlmClient` that never leaves the process.
///
/// Queued failures are returned first, one per call; after that every call
/// yields the configured reply. An optional delay makes timeouts testable.
#[derive(Debug)]
pub struct MockClient {
    reply: Reply,
    delay: Option<Duration>,
    failures: Mutex<VecDeque<ServiceFailure>>,
    healthy: bool,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockClient {
    /// Always answer with `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fixed(response.into()))
    }

    /// Answer with the prompt itself.
    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            failures: Mutex::new(VecDeque::new()),
            healthy: true,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a failure for the next unanswered call.
    pub fn fail_with(self, kind: ServiceFailure) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(kind);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Number of `complete` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        if let Some(kind) = failure {
            return Err(AppError::generation(kind, "scripted mock failure"));
        }

        let content = match &self.reply {
            Reply::Fixed(text) => text.clone(),
            Reply::Echo => request.prompt.clone(),
        };

        Ok(LlmResponse {
            usage: LlmUsage::new(request.prompt.len() as u32, content.len() as u32),
            content,
            model: request.model.clone(),
            done: true,
        })
    }

    async fn health_check(&self) -> AppResult<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(AppError::generation(
                ServiceFailure::Unreachable,
                "mock marked unhealthy",
            ))
        }
    }
}
