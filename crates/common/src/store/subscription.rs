use tokio::sync::watch;

use crate::envelope::EnvelopeBatch;

/// Consumer half of a message log subscription
///
/// Only the newest snapshot is retained: a consumer that falls behind skips
/// straight to the latest batch. Dropping the subscription cancels it.
#[derive(Debug)]
pub struct Subscription {
    batches: watch::Receiver<Option<EnvelopeBatch>>,
    cancel: watch::Sender<bool>,
}

/// Producer half handed to the store's background task
#[derive(Debug)]
pub struct SubscriptionSink {
    batches: watch::Sender<Option<EnvelopeBatch>>,
    cancel: watch::Receiver<bool>,
}

impl Subscription {
    pub fn channel() -> (Subscription, SubscriptionSink) {
        let (batch_tx, batch_rx) = watch::channel(None);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Subscription {
                batches: batch_rx,
                cancel: cancel_tx,
            },
            SubscriptionSink {
                batches: batch_tx,
                cancel: cancel_rx,
            },
        )
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once the subscription is cancelled or the producer has
    /// gone away.
    pub async fn next(&mut self) -> Option<EnvelopeBatch> {
        if self.is_cancelled() {
            return None;
        }
        self.batches.changed().await.ok()?;
        if self.is_cancelled() {
            return None;
        }
        self.batches.borrow_and_update().clone()
    }

    /// Stop the producer. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl SubscriptionSink {
    /// Publish a snapshot; returns false once nobody is listening
    pub fn publish(&self, batch: EnvelopeBatch) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.batches.send(Some(batch)).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.batches.is_closed()
    }

    /// Resolves once the consumer cancels or drops its subscription
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            tokio::select! {
                changed = self.cancel.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = self.batches.closed() => return,
            }
        }
    }
}
