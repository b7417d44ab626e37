//! Rate-limited delivery of status text to a [`StatusSink`].

use std::sync::Arc;
use std::time::Duration;

use relayfile_session::SessionKey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collaborators::{StatusError, StatusSink};

/// Forwards the latest posted status text at most once per interval.
///
/// Posting never waits on the sink. Texts posted while a delivery is in
/// flight or during the cool-down replace each other, so only the newest
/// one is sent.
pub struct StatusThrottle {
    tx: Arc<watch::Sender<Option<String>>>,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cloneable handle for posting into a [`StatusThrottle`].
#[derive(Clone)]
pub struct StatusPoster {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl StatusPoster {
    pub fn post(&self, text: String) {
        self.tx.send_replace(Some(text));
    }
}

impl StatusThrottle {
    pub fn spawn(sink: Arc<dyn StatusSink>, key: SessionKey, interval: Duration) -> Self {
        let (tx, mut rx) = watch::channel(None::<String>);
        let stop = CancellationToken::new();
        let task_stop = stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_stop.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let text = rx.borrow_and_update().clone();
                if let Some(text) = text {
                    deliver(sink.as_ref(), key, text).await;
                }

                tokio::select! {
                    biased;
                    _ = task_stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            let pending = {
                let latest = rx.borrow_and_update();
                latest.has_changed().then(|| (*latest).clone()).flatten()
            };
            if let Some(text) = pending {
                deliver(sink.as_ref(), key, text).await;
            }
        });

        Self {
            tx: Arc::new(tx),
            stop,
            handle,
        }
    }

    pub fn poster(&self) -> StatusPoster {
        StatusPoster {
            tx: Arc::clone(&self.tx),
        }
    }

    pub fn post(&self, text: String) {
        self.tx.send_replace(Some(text));
    }

    /// Stops forwarding, delivers the newest text not yet sent (skipping
    /// the cool-down) and waits for the delivery to finish.
    pub async fn finish(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

/// Sends one status update. Failures are logged and swallowed.
pub(crate) async fn deliver(sink: &dyn StatusSink, key: SessionKey, text: String) {
    match sink.update_status(key, text).await {
        Ok(()) => {}
        Err(StatusError::Throttled) => debug!(key = %key, "status update throttled by sink"),
        Err(e) => debug!(key = %key, error = %e, "status update failed"),
    }
}
