/// Timeout and retry wrapper around any generative model
use super::{GenerationOptions, GenerativeModel};
use crate::error::{BugbusterError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub struct RetryingModel {
    inner: Arc<dyn GenerativeModel>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingModel {
    pub fn new(
        inner: Arc<dyn GenerativeModel>,
        timeout: Duration,
        max_retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            inner,
            timeout,
            max_retries,
            backoff,
        }
    }
}

#[async_trait]
impl GenerativeModel for RetryingModel {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let mut attempt = 0;
        loop {
            let error = match timeout(self.timeout, self.inner.generate(prompt, options)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e,
                Err(_) => BugbusterError::Generation(format!(
                    "{} timed out after {:?}",
                    self.inner.model_name(),
                    self.timeout
                )),
            };

            if attempt >= self.max_retries {
                return Err(match error {
                    BugbusterError::Generation(_) => error,
                    other => BugbusterError::Generation(other.to_string()),
                });
            }

            attempt += 1;
            let delay = self.backoff * attempt;
            tracing::warn!(
                "Generation attempt {} failed ({}), retrying in {:?}",
                attempt,
                error,
                delay
            );
            sleep(delay).await;
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then answers
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerativeModel for Flaky {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(BugbusterError::Generation("boom".to_string()))
            } else {
                Ok("answer".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    struct Slow;

    #[async_trait]
    impl GenerativeModel for Slow {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
            sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn wrap(inner: Arc<dyn GenerativeModel>, retries: u32) -> RetryingModel {
        RetryingModel::new(
            inner,
            Duration::from_millis(50),
            retries,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let flaky = Arc::new(Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let model = wrap(flaky.clone(), 1);
        let text = model
            .generate("p", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "answer");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let flaky = Arc::new(Flaky {
            failures: 5,
            calls: AtomicU32::new(0),
        });
        let model = wrap(flaky.clone(), 1);
        let result = model.generate("p", &GenerationOptions::default()).await;
        assert!(matches!(result, Err(BugbusterError::Generation(_))));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_generation_error() {
        let model = wrap(Arc::new(Slow), 0);
        let result = model.generate("p", &GenerationOptions::default()).await;
        match result {
            Err(BugbusterError::Generation(message)) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
