//! Cooperative cancellation signal shared by every outstanding fetch and decode.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::util::{Error, Result};

/// Cloneable cancellation signal.
///
/// All clones observe the same flag. Once raised it stays raised.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { flag: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once the signal is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        if rx.wait_for(|raised| *raised).await.is_err() {
            // Sender lives as long as this token; unreachable in practice.
            std::future::pending::<()>().await;
        }
    }

    /// Fail fast with [`Error::Cancelled`] when the signal is already raised.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the signal is raised first.
    ///
    /// A raised signal drops `fut` and resolves to [`Error::Cancelled`].
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            res = fut => res,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_shared_by_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(other.check(), Err(Error::Cancelled)));
        // Already raised: resolves immediately.
        other.cancelled().await;
    }

    #[tokio::test]
    async fn test_run_drops_pending_future() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let res: Result<()> = token
            .run(async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let v = token.run(async { Ok(7) }).await.unwrap();
        assert_eq!(v, 7);
    }
}
