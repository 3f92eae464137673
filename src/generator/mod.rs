//! Generator: sends the system instruction and user prompt to a
//! [`GenerativeBackend`] with a bounded retry loop and a process-wide
//! concurrency cap.
//!
//! Grounded in the pack's agent-orchestration style (`Semaphore`-guarded
//! fan-out, `Instant`-based attempt timing): here there is no fan-out —
//! one generation call per request, serialized after retrieval and
//! rerank — but the same acquire-before-call, release-on-every-exit-path
//! semaphore discipline applies.

#[cfg(feature = "openai-backend")]
pub mod openai;

use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::collaborators::traits::{GenerationRequest, GenerativeBackend};
use crate::config::PipelineConfig;
use crate::error::GenerationError;

/// Runs one generation call through `backend`, retrying transient
/// failures with exponential backoff and a hard per-attempt timeout.
///
/// Acquires `semaphore` before every attempt and releases it (by drop)
/// before backing off, so the process-wide concurrency cap only bounds
/// calls actually in flight, not the backoff sleep between them.
///
/// # Errors
///
/// Returns the last [`GenerationError`] once `config.generator_max_attempts`
/// is exhausted, or immediately for a non-retryable error kind.
pub async fn generate(
    backend: &dyn GenerativeBackend,
    semaphore: &Semaphore,
    request: &GenerationRequest,
    config: &PipelineConfig,
) -> Result<String, GenerationError> {
    let attempt_timeout = Duration::from_secs(config.generator_attempt_timeout_secs);
    let mut last_error = GenerationError::Timeout;

    for attempt in 0..config.generator_max_attempts {
        let permit = semaphore.acquire().await.map_err(|_| {
            GenerationError::Configuration("generation semaphore closed".to_string())
        })?;

        let outcome = timeout(attempt_timeout, backend.complete(request)).await;
        drop(permit);

        let error = match outcome {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(err)) => err,
            Err(_) => GenerationError::Timeout,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        last_error = error;

        if attempt + 1 < config.generator_max_attempts {
            tokio::time::sleep(backoff_delay(attempt, config)).await;
        }
    }

    Err(GenerationError::Transient {
        attempts: config.generator_max_attempts,
        message: last_error.to_string(),
    })
}

fn backoff_delay(attempt: u32, config: &PipelineConfig) -> Duration {
    let factor = config.generator_backoff_factor.saturating_pow(attempt);
    let secs = config.generator_backoff_base_secs.saturating_mul(u64::from(factor));
    Duration::from_secs(secs.min(config.generator_backoff_cap_secs))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    fn sample_request() -> GenerationRequest {
        GenerationRequest {
            system_instruction: "system".to_string(),
            user_prompt: "prompt".to_string(),
            temperature: 0.2,
            top_k: None,
            top_p: None,
            max_output_tokens: 256,
        }
    }

    struct FlakyBackend {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerativeBackend for FlakyBackend {
        fn model_label(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(GenerationError::Timeout)
            } else {
                Ok("done".to_string())
            }
        }
    }

    struct AlwaysInvalidArgument;

    #[async_trait]
    impl GenerativeBackend for AlwaysInvalidArgument {
        fn model_label(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Err(GenerationError::InvalidArgument("bad temperature".to_string()))
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let backend = FlakyBackend {
            fail_times: 2,
            calls: AtomicU32::new(0),
        };
        let semaphore = Semaphore::new(1);
        let config = PipelineConfig::builder()
            .with_generator_retries(3, 5)
            .build();
        let result = generate(&backend, &semaphore, &sample_request(), &config).await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let backend = AlwaysInvalidArgument;
        let semaphore = Semaphore::new(1);
        let config = PipelineConfig::default();
        let result = generate(&backend, &semaphore, &sample_request(), &config).await;
        assert!(matches!(result, Err(GenerationError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_transient() {
        let backend = FlakyBackend {
            fail_times: 10,
            calls: AtomicU32::new(0),
        };
        let semaphore = Semaphore::new(1);
        let config = PipelineConfig::builder()
            .with_generator_retries(2, 5)
            .build();
        let result = generate(&backend, &semaphore, &sample_request(), &config).await;
        assert!(matches!(result, Err(GenerationError::Transient { attempts: 2, .. })));
    }

    #[test]
    fn backoff_delay_grows_and_caps() {
        let config = PipelineConfig::default();
        assert_eq!(backoff_delay(0, &config), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, &config), Duration::from_secs(2));
        assert_eq!(backoff_delay(10, &config), Duration::from_secs(30));
    }
}
