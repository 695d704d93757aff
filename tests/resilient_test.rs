//! Integration tests for the resilient call wrapper
//!
//! Uses a scripted in-process client to verify retry counts, JSON recovery
//! and the permanent/transient split without touching the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use futureyou::config::RequestConfig;
use futureyou::error::{ParseError, ReasoningError, ReasoningResult};
use futureyou::reasoning::{ReasoningClient, ResilientCaller};

/// Returns one scripted response per call, cycling the last one forever.
struct ScriptedClient {
    responses: Mutex<Vec<ReasoningResult<String>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(responses: Vec<ReasoningResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn generate(&self, _prompt: &str, _schema_hint: Option<&str>) -> ReasoningResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.remove(0)
        } else {
            match responses.first() {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(_)) | None => Err(ReasoningError::EmptyResponse),
            }
        }
    }
}

fn fast_config() -> RequestConfig {
    RequestConfig {
        timeout_ms: 1000,
        max_attempts: 3,
        retry_delay_ms: 1,
        max_delay_ms: 4,
    }
}

fn parse_number(raw: &str) -> Result<u64, ParseError> {
    raw.trim().parse().map_err(|_| ParseError::new("not a number"))
}

#[tokio::test]
async fn test_first_attempt_success_makes_one_call() {
    let client = Arc::new(ScriptedClient::new(vec![Ok("42".to_string())]));
    let caller = ResilientCaller::new(client.clone(), fast_config());

    let value = caller
        .call("profile", "prompt", None, parse_number)
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_parse_failure_exhausts_all_attempts() {
    let client = Arc::new(ScriptedClient::new(vec![Ok("garbage".to_string())]));
    let caller = ResilientCaller::new(client.clone(), fast_config());

    let err = caller
        .call("profile", "prompt", None, parse_number)
        .await
        .unwrap_err();

    assert_eq!(client.calls(), 3, "every attempt must hit the client");
    assert_eq!(err.stage, "profile");
    assert_eq!(err.attempts, 3);
    assert_eq!(err.last_raw.as_deref(), Some("garbage"));
    assert!(err.last_error.contains("not a number"));
}

#[tokio::test]
async fn test_transient_error_then_success_retries() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(ReasoningError::RateLimited {
            message: "quota".to_string(),
        }),
        Ok("7".to_string()),
    ]));
    let caller = ResilientCaller::new(client.clone(), fast_config());

    let value = caller
        .call("simulate:1yr_realistic", "prompt", None, parse_number)
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_permanent_error_aborts_without_retry() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(ReasoningError::InvalidCredentials {
            message: "bad key".to_string(),
        }),
        Ok("7".to_string()),
    ]));
    let caller = ResilientCaller::new(client.clone(), fast_config());

    let err = caller
        .call("advise", "prompt", None, parse_number)
        .await
        .unwrap_err();

    assert_eq!(client.calls(), 1, "permanent failures must not retry");
    assert_eq!(err.attempts, 1);
    assert!(err.last_error.contains("Invalid credentials"));
}

#[tokio::test]
async fn test_fenced_json_recovered_without_extra_attempt() {
    let wrapped = "Here you go:\n```json\n{\"value\": 9}\n```\nLet me know!";
    let client = Arc::new(ScriptedClient::new(vec![Ok(wrapped.to_string())]));
    let caller = ResilientCaller::new(client.clone(), fast_config());

    let parser = |raw: &str| -> Result<serde_json::Value, ParseError> {
        serde_json::from_str(raw).map_err(ParseError::from)
    };

    let value = caller.call("analyze", "prompt", None, parser).await.unwrap();

    assert_eq!(value["value"], 9);
    assert_eq!(client.calls(), 1, "recovery must not consume another attempt");
}

#[tokio::test]
async fn test_unrecoverable_text_keeps_last_raw() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(
        "I cannot answer that.".to_string()
    )]));
    let caller = ResilientCaller::new(client.clone(), fast_config());

    let parser = |raw: &str| -> Result<serde_json::Value, ParseError> {
        serde_json::from_str(raw).map_err(ParseError::from)
    };

    let err = caller
        .call("analyze", "prompt", None, parser)
        .await
        .unwrap_err();

    assert_eq!(err.last_raw.as_deref(), Some("I cannot answer that."));
}
