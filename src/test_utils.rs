//! Test utilities and mock factories.
//!
//! This module provides shared testing infrastructure:
//! - `MockMessagesApi` factories
//! - A delaying client that records how many requests overlap
//! - Common fixtures
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::anthropic::{MessagesRequest, MessagesResponse};
use crate::error::AnthropicError;
use crate::traits::{MessagesApi, MockMessagesApi};

/// Requests seen by a capturing mock.
pub type Captured = Arc<Mutex<Vec<MessagesRequest>>>;

/// First user message of a request.
pub fn prompt_of(request: &MessagesRequest) -> String {
    request
        .messages
        .first()
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Create a mock that answers every request with `response`.
#[must_use]
pub fn mock_messages_success(response: impl Into<String>) -> MockMessagesApi {
    let response = response.into();
    let mut mock = MockMessagesApi::new();
    mock.expect_create_message()
        .returning(move |request| Ok(MessagesResponse::from_text(request.model, response.clone())));
    mock
}

/// Create a mock that fails every request with `error`.
#[must_use]
pub fn mock_messages_error(error: AnthropicError) -> MockMessagesApi {
    let mut mock = MockMessagesApi::new();
    mock.expect_create_message()
        .returning(move |_| Err(error.clone()));
    mock
}

/// Create a mock that records every request and echoes its prompt.
///
/// Prompts containing `"fail"` get a 500 API error instead.
#[must_use]
pub fn mock_messages_capturing() -> (MockMessagesApi, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let mut mock = MockMessagesApi::new();
    mock.expect_create_message().returning(move |request| {
        let prompt = prompt_of(&request);
        let model = request.model.clone();
        sink.lock().unwrap().push(request);
        if prompt.contains("fail") {
            Err(AnthropicError::Api {
                status: 500,
                error_type: "api_error".to_string(),
                message: "Internal server error".to_string(),
            })
        } else {
            Ok(MessagesResponse::from_text(model, format!("echo: {prompt}")))
        }
    });
    (mock, captured)
}

/// Client that sleeps before echoing the prompt and tracks peak concurrency.
///
/// Each prompt must be a number of milliseconds to sleep.
#[derive(Debug, Default)]
pub struct DelayedEcho {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl DelayedEcho {
    /// Highest number of overlapping requests observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagesApi for DelayedEcho {
    async fn create_message(
        &self,
        request: MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let prompt = prompt_of(&request);
        let delay_ms: u64 = prompt.trim().parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(MessagesResponse::from_text(request.model, prompt))
    }
}

/// Prompts as owned strings.
pub fn prompts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_messages_success() {
        let mock = mock_messages_success("Hello!");
        let response = mock
            .create_message(MessagesRequest::single_prompt("m", 8, "hi"))
            .await
            .unwrap();
        assert_eq!(response.text().as_deref(), Some("Hello!"));
    }

    #[tokio::test]
    async fn test_mock_messages_error() {
        let mock = mock_messages_error(AnthropicError::AuthenticationFailed);
        let result = mock
            .create_message(MessagesRequest::single_prompt("m", 8, "hi"))
            .await;
        assert!(matches!(result, Err(AnthropicError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_mock_messages_capturing() {
        let (mock, captured) = mock_messages_capturing();
        let ok = mock
            .create_message(MessagesRequest::single_prompt("m", 8, "hi"))
            .await
            .unwrap();
        let failed = mock
            .create_message(MessagesRequest::single_prompt("m", 8, "please fail"))
            .await;

        assert_eq!(ok.text().as_deref(), Some("echo: hi"));
        assert!(failed.is_err());
        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delayed_echo_tracks_peak() {
        let client = DelayedEcho::default();
        let (a, b) = tokio::join!(
            client.create_message(MessagesRequest::single_prompt("m", 8, "20")),
            client.create_message(MessagesRequest::single_prompt("m", 8, "20")),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(client.peak(), 2);
    }
}
