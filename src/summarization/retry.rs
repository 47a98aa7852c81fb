use super::{CompletionClient, CompletionError, CompletionRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff applied to retryable provider failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts made after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy with the default base delay.
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(MAX_DELAY)
    }
}

/// Client decorator retrying transient failures of the wrapped client.
pub struct RetryingClient {
    inner: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: Arc<dyn CompletionClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl CompletionClient for RetryingClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut retry = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retry);
                    tracing::warn!(
                        error = %error,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Completion request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        calls: AtomicUsize,
        script: Mutex<Vec<Result<String, CompletionError>>>,
    }

    impl ScriptedClient {
        fn new(mut script: Vec<Result<String, CompletionError>>) -> Self {
            script.reverse();
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .expect("script lock")
                .pop()
                .unwrap_or(Err(CompletionError::EmptyCompletion))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".into(),
            messages: Vec::new(),
            temperature: 0.0,
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let inner = Arc::new(ScriptedClient::new(vec![
            Err(CompletionError::ProviderUnavailable("down".into())),
            Err(CompletionError::GenerationFailed {
                status: 502,
                message: "bad gateway".into(),
            }),
            Ok("done".into()),
        ]));
        let client = RetryingClient::new(inner.clone(), policy(2));

        assert_eq!(client.complete(request()).await.expect("text"), "done");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let inner = Arc::new(ScriptedClient::new(vec![
            Err(CompletionError::InvalidResponse("garbage".into())),
            Ok("never".into()),
        ]));
        let client = RetryingClient::new(inner.clone(), policy(3));

        let error = client.complete(request()).await.unwrap_err();
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(ScriptedClient::new(vec![
            Err(CompletionError::ProviderUnavailable("1".into())),
            Err(CompletionError::ProviderUnavailable("2".into())),
            Err(CompletionError::ProviderUnavailable("3".into())),
        ]));
        let client = RetryingClient::new(inner.clone(), policy(1));

        let error = client.complete(request()).await.unwrap_err();
        assert!(matches!(error, CompletionError::ProviderUnavailable(ref m) if m == "2"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(20), MAX_DELAY);
    }
}
