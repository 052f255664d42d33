//! Mock semantic oracle for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::matching::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

/// A responder that produces oracle text from the request.
type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

enum Scripted {
    Text(String, Option<Duration>),
    Error(LlmError),
}

/// Mock implementation of the LlmClient trait.
///
/// Each call is answered, in order of precedence, by:
/// 1. the next scripted response or error (FIFO),
/// 2. the responder closure, if set,
/// 3. the default response, if set,
/// 4. otherwise [`LlmError::NotConfigured`].
///
/// # Example
///
/// ```rust,ignore
/// use trialmatch_core::testing::MockLlmClient;
///
/// let oracle = MockLlmClient::new();
/// oracle.push_response(r#"{"match": true, "confidence": 0.9, "reasoning": "synonyms"}"#);
/// oracle.push_error(LlmError::Http("connection reset".into()));
///
/// // ... run the client under test ...
/// assert_eq!(oracle.call_count(), 2);
/// ```
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Scripted>>,
    responder: Option<Responder>,
    default_response: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl std::fmt::Debug for MockLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmClient")
            .field("calls", &self.call_count())
            .field("default_response", &self.default_response)
            .finish_non_exhaustive()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    /// A mock with no scripted answers.
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            responder: None,
            default_response: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A mock answering every call with `text`.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            default_response: Some(text.into()),
            ..Self::new()
        }
    }

    /// A mock answering through `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a response for the next unanswered call.
    pub fn push_response(&self, text: impl Into<String>) {
        self.script(Scripted::Text(text.into(), None));
    }

    /// Queue a response that is delivered after `delay`.
    pub fn push_delayed_response(&self, text: impl Into<String>, delay: Duration) {
        self.script(Scripted::Text(text.into(), Some(delay)));
    }

    /// Queue a failure for the next unanswered call.
    pub fn push_error(&self, error: LlmError) {
        self.script(Scripted::Error(error));
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model requested by each call, in call order.
    pub fn requested_models(&self) -> Vec<String> {
        self.lock_requests()
            .iter()
            .map(|r| r.model.clone().unwrap_or_else(|| self.model().to_string()))
            .collect()
    }

    /// Prompts sent so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.lock_requests().iter().map(|r| r.prompt.clone()).collect()
    }

    fn script(&self, entry: Scripted) {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(entry);
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<CompletionRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_answer(&self, request: &CompletionRequest) -> (Result<String, LlmError>, Option<Duration>) {
        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match scripted {
            Some(Scripted::Text(text, delay)) => (Ok(text), delay),
            Some(Scripted::Error(e)) => (Err(e), None),
            None => match (&self.responder, &self.default_response) {
                (Some(responder), _) => (responder(request), None),
                (None, Some(text)) => (Ok(text.clone()), None),
                (None, None) => (Err(LlmError::NotConfigured), None),
            },
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (answer, delay) = self.next_answer(&request);
        let model = request.model.clone().unwrap_or_else(|| self.model().to_string());
        self.lock_requests().push(request);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        answer.map(|text| CompletionResponse {
            text,
            usage: LlmUsage {
                input_tokens: 120,
                output_tokens: 40,
            },
            model,
        })
    }
}
