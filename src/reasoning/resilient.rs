use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, error, info, warn};

use super::ReasoningClient;
use crate::config::RequestConfig;
use crate::error::{ParseError, ResilientCallFailure};

/// Wraps reasoning calls with bounded retry, exponential backoff and
/// tolerant parsing.
///
/// Two failure classes are retried: transient call failures and parse
/// failures (the model returned non-conforming text). Permanent client
/// failures abort immediately. Exhausting retries surfaces a
/// [`ResilientCallFailure`] carrying the last raw payload; a default value is
/// never substituted. The caller emits trace events but does not write to
/// persistent storage.
#[derive(Clone)]
pub struct ResilientCaller {
    client: Arc<dyn ReasoningClient>,
    request_config: RequestConfig,
}

impl ResilientCaller {
    /// Create a new resilient caller around a reasoning client
    pub fn new(client: Arc<dyn ReasoningClient>, request_config: RequestConfig) -> Self {
        Self {
            client,
            request_config,
        }
    }

    /// Call the reasoning client and parse its response into `T`.
    ///
    /// `parser` converts raw model text into the target type, raising
    /// [`ParseError`] on malformed input. On parse failure the caller first
    /// attempts local recovery (stripping prose and code fences around an
    /// embedded JSON block) before the attempt counts as failed.
    pub async fn call<T, P>(
        &self,
        stage: &str,
        prompt: &str,
        schema_hint: Option<&str>,
        parser: P,
    ) -> Result<T, ResilientCallFailure>
    where
        P: Fn(&str) -> Result<T, ParseError>,
    {
        let mut last_raw: Option<String> = None;
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.request_config.max_attempts {
            if attempt > 1 {
                let delay = self.backoff_delay(attempt);
                warn!(
                    stage = %stage,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying reasoning call"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            let raw = match self.client.generate(prompt, schema_hint).await {
                Ok(raw) => raw,
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        stage = %stage,
                        attempt = attempt,
                        latency_ms = latency.as_millis() as u64,
                        error = %e,
                        "Reasoning call failed"
                    );
                    last_error = e.to_string();
                    if !e.is_transient() {
                        // Invalid credentials and similar are not worth retrying.
                        return Err(ResilientCallFailure {
                            stage: stage.to_string(),
                            attempts: attempt,
                            last_raw,
                            last_error,
                        });
                    }
                    continue;
                }
            };

            let latency = start.elapsed();

            match parser(&raw) {
                Ok(value) => {
                    info!(
                        stage = %stage,
                        attempt = attempt,
                        latency_ms = latency.as_millis() as u64,
                        "Reasoning call succeeded"
                    );
                    return Ok(value);
                }
                Err(parse_err) => {
                    // Models commonly wrap structured data in explanatory text
                    // or code fences; re-parse the embedded block once before
                    // counting this attempt as failed.
                    if let Some(block) = extract_json_block(&raw) {
                        if block != raw.trim() {
                            if let Ok(value) = parser(&block) {
                                debug!(
                                    stage = %stage,
                                    attempt = attempt,
                                    "Recovered structured payload from wrapped response"
                                );
                                return Ok(value);
                            }
                        }
                    }

                    warn!(
                        stage = %stage,
                        attempt = attempt,
                        latency_ms = latency.as_millis() as u64,
                        error = %parse_err,
                        "Model returned non-conforming text"
                    );
                    last_error = parse_err.to_string();
                    last_raw = Some(raw);
                }
            }
        }

        Err(ResilientCallFailure {
            stage: stage.to_string(),
            attempts: self.request_config.max_attempts,
            last_raw,
            last_error,
        })
    }

    /// Backoff delay before the given attempt (attempt numbering starts at 1).
    ///
    /// Doubles from the configured base delay, capped at the maximum, with
    /// uniform jitter of up to a quarter of the computed delay added on top.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2);
        let base = self
            .request_config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(self.request_config.max_delay_ms);
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base / 4)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

/// Extract an embedded JSON object or array from prose-wrapped model output.
///
/// Strips markdown code fences, then slices from the first opening brace or
/// bracket to the last matching closer. Returns `None` when no JSON-like
/// block is present.
pub fn extract_json_block(raw: &str) -> Option<String> {
    let defenced: String = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start_obj = defenced.find('{');
    let start_arr = defenced.find('[');

    let (start, close) = match (start_obj, start_arr) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };

    let end = defenced.rfind(close)?;
    if end < start {
        return None;
    }

    Some(defenced[start..=end].trim().to_string())
}
