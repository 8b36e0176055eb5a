//! Structured fan-out over heterogeneous load units.

use futures::future::{self, BoxFuture};

use crate::util::Result;

/// One unit of load work.
pub type LoadUnit<'a> = BoxFuture<'a, Result<()>>;

/// Drive every unit concurrently and wait for all of them.
///
/// The first failure is returned and the remaining units are dropped, which
/// releases whatever they were holding (load cells reset, pool slots freed).
pub async fn join_all<'a, I>(units: I) -> Result<()>
where
    I: IntoIterator<Item = LoadUnit<'a>>,
{
    future::try_join_all(units).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Error;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_units_complete() {
        let a = AtomicBool::new(false);
        let b = AtomicBool::new(false);
        let units: Vec<LoadUnit<'_>> = vec![
            async {
                a.store(true, Ordering::SeqCst);
                Ok(())
            }
            .boxed(),
            async {
                tokio::time::sleep(Duration::from_millis(2)).await;
                b.store(true, Ordering::SeqCst);
                Ok(())
            }
            .boxed(),
        ];
        join_all(units).await.unwrap();
        assert!(a.load(Ordering::SeqCst) && b.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let units: Vec<LoadUnit<'static>> = vec![
            async { Err(Error::decode("bad")) }.boxed(),
            async {
                std::future::pending::<()>().await;
                Ok(())
            }
            .boxed(),
        ];
        let err = join_all(units).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_is_ok() {
        join_all(Vec::<LoadUnit<'static>>::new()).await.unwrap();
    }
}
