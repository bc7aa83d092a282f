use crate::config::AnalysisSettings;
use crate::errors::{AnalysisError, EngineError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// At most this many distinct backends are tried per request.
pub const MAX_BACKENDS: usize = 2;

/// One planned call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub backend: String,
    /// 1-based within the backend.
    pub attempt: u32,
    /// Sleep before this call; zero when switching backends.
    pub wait: Duration,
}

/// Fixed retries with fixed backoff across an ordered list of backends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backends: Vec<String>,
    attempts_per_backend: u32,
    backoff: Duration,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        backends: impl IntoIterator<Item = String>,
        attempts_per_backend: u32,
        backoff: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        let mut uniq: Vec<String> = Vec::new();
        for b in backends {
            let b = b.trim().to_string();
            if !b.is_empty() && !uniq.contains(&b) {
                uniq.push(b);
            }
        }
        uniq.truncate(MAX_BACKENDS);
        Self {
            backends: uniq,
            attempts_per_backend: attempts_per_backend.max(1),
            backoff,
            attempt_timeout,
        }
    }

    pub fn from_settings(s: &AnalysisSettings) -> Self {
        Self::new(
            std::iter::once(s.primary_model.clone()).chain(s.fallback_model.clone()),
            s.attempts_per_backend,
            Duration::from_millis(s.backoff_ms),
            Duration::from_millis(s.timeout_ms),
        )
    }

    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    pub fn schedule(&self) -> Vec<Attempt> {
        self.backends
            .iter()
            .flat_map(|b| {
                (1..=self.attempts_per_backend).map(move |n| Attempt {
                    backend: b.clone(),
                    attempt: n,
                    wait: if n == 1 { Duration::ZERO } else { self.backoff },
                })
            })
            .collect()
    }

    /// Runs `call` along the schedule until one succeeds.
    ///
    /// A non-retryable error moves on to the next backend; a malformed payload
    /// ends the whole run. Cancellation interrupts both the call and the
    /// backoff sleep.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<(T, String), EngineError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let mut made = 0u32;
        let mut last: Option<AnalysisError> = None;
        let mut skip_backend: Option<String> = None;

        for step in self.schedule() {
            if skip_backend.as_deref() == Some(step.backend.as_str()) {
                continue;
            }
            if !step.wait.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(step.wait) => {}
                }
            }

            made += 1;
            tracing::info!(
                event = "analysis_attempt",
                backend = %step.backend,
                attempt = step.attempt,
                total = made
            );

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                r = tokio::time::timeout(self.attempt_timeout, call(step.backend.clone())) => {
                    r.unwrap_or(Err(AnalysisError::Timeout(self.attempt_timeout)))
                }
            };

            match outcome {
                Ok(v) => return Ok((v, step.backend)),
                Err(AnalysisError::Cancelled) => return Err(EngineError::Cancelled),
                Err(AnalysisError::MalformedPayload(msg)) => {
                    tracing::warn!(event = "analysis_failed", backend = %step.backend, code = "malformed_payload", error = %msg);
                    return Err(EngineError::MalformedPayload(msg));
                }
                Err(e) => {
                    tracing::warn!(
                        event = "analysis_failed",
                        backend = %step.backend,
                        attempt = step.attempt,
                        code = e.code(),
                        retryable = e.is_retryable(),
                        error = %e
                    );
                    if !e.is_retryable() {
                        skip_backend = Some(step.backend.clone());
                    }
                    last = Some(e);
                }
            }
        }

        Err(EngineError::AnalysisFailed {
            attempts: made,
            last: last
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no analysis backend configured".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            ["primary".to_string(), "fallback".to_string()],
            2,
            Duration::from_millis(1500),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn schedule_is_two_by_two() {
        let s = policy().schedule();
        let plan: Vec<(&str, u32, u128)> = s
            .iter()
            .map(|a| (a.backend.as_str(), a.attempt, a.wait.as_millis()))
            .collect();
        assert_eq!(
            plan,
            vec![
                ("primary", 1, 0),
                ("primary", 2, 1500),
                ("fallback", 1, 0),
                ("fallback", 2, 1500)
            ]
        );
    }

    #[test]
    fn backends_are_deduplicated_and_capped() {
        let p = RetryPolicy::new(
            ["a", "a", " ", "b", "c"].map(String::from),
            0,
            Duration::ZERO,
            Duration::from_secs(1),
        );
        assert_eq!(p.backends(), &["a".to_string(), "b".to_string()]);
        assert_eq!(p.schedule().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_after_retries() {
        let seen = Mutex::new(Vec::new());
        let (v, backend) = policy()
            .execute(&CancellationToken::new(), |b| {
                seen.lock().unwrap().push(b.clone());
                async move {
                    if b == "primary" {
                        Err(AnalysisError::service(&b, "503", true))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!((v, backend.as_str()), (7, "fallback"));
        assert_eq!(*seen.lock().unwrap(), vec!["primary", "primary", "fallback"]);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_skips_remaining_attempts() {
        let seen = Mutex::new(Vec::new());
        let err = policy()
            .execute::<(), _, _>(&CancellationToken::new(), |b| {
                seen.lock().unwrap().push(b.clone());
                async move { Err(AnalysisError::service(&b, "400", false)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AnalysisFailed { attempts: 2, .. }));
        assert_eq!(*seen.lock().unwrap(), vec!["primary", "fallback"]);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_terminal() {
        let err = policy()
            .execute::<(), _, _>(&CancellationToken::new(), |_| async {
                Err(AnalysisError::MalformedPayload("garbage".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E_MALFORMED_PAYLOAD");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_hung_call() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = policy()
            .execute::<(), _, _>(&token, |_| std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
