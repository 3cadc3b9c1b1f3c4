//! Per-call time bounds and request cancellation.
//!
//! Every outbound collaborator call goes through [`bounded`], which races the
//! call against its timeout and the request's [`CancelSignal`].

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Cancels the paired [`CancelSignal`] when told to, or when dropped.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) { let _ = self.tx.send(true); }
}

impl Drop for CancelHandle {
    fn drop(&mut self) { self.cancel(); }
}

#[derive(Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self { Self { rx: None } }

    pub fn is_cancelled(&self) -> bool { self.rx.as_ref().is_some_and(|rx| *rx.borrow()) }

    /// Resolves once the paired handle cancels or is dropped.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else { return std::future::pending().await };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() { return; }
            if rx.changed().await.is_err() { return; }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Run one collaborator call under `limit`, giving up early on cancellation.
pub async fn bounded<T, F>(service: &'static str, limit: Duration, cancel: &CancelSignal, call: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled(service)),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Error::collaborator(service, &err)),
            Err(_) => Err(Error::Timeout { service, millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX) }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_success_and_failure() {
        let cancel = CancelSignal::never();
        let ok = bounded("search", Duration::from_secs(1), &cancel, async { Ok::<_, anyhow::Error>(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        let err = bounded("search", Duration::from_secs(1), &cancel, async { Err::<(), _>(anyhow::anyhow!("boom")) }).await;
        assert!(matches!(err, Err(Error::Collaborator { service: "search", .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let cancel = CancelSignal::never();
        let res = bounded("generation", Duration::from_millis(50), &cancel, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, anyhow::Error>(())
        })
        .await;
        assert!(matches!(res, Err(Error::Timeout { service: "generation", millis: 50 })));
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_in_flight_calls() {
        let (handle, signal) = cancel_pair();
        let call = tokio::spawn({
            let signal = signal.clone();
            async move {
                bounded("translation", Duration::from_secs(60), &signal, async {
                    std::future::pending::<anyhow::Result<()>>().await
                })
                .await
            }
        });
        drop(handle);
        let res = call.await.unwrap();
        assert!(matches!(res, Err(Error::Cancelled("translation"))));
        assert!(signal.is_cancelled());
    }
}
