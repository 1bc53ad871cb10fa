//! Zero-buffer handoff channel.
//!
//! A [`RendezvousSender::send`] completes only after the matching
//! [`RendezvousReceiver::recv`] has taken the value, so the sender cannot
//! run ahead of its peer. Built from a single-slot `mpsc` queue plus a
//! per-value `oneshot` acknowledgement.
//!
//! If a `send` future is dropped after its value was queued, the
//! receiver may still take that value; the sender just never learns.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The other end of the channel is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rendezvous channel closed")]
pub struct Closed;

struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Sending half. Not `Clone`: each channel has exactly one producer.
pub struct RendezvousSender<T> {
    inner: mpsc::Sender<Handoff<T>>,
}

/// Receiving half.
pub struct RendezvousReceiver<T> {
    inner: mpsc::Receiver<Handoff<T>>,
}

/// Creates a rendezvous channel.
#[must_use]
pub fn channel<T>() -> (RendezvousSender<T>, RendezvousReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (RendezvousSender { inner: tx }, RendezvousReceiver { inner: rx })
}

impl<T> RendezvousSender<T> {
    /// Hands `value` to the receiver, waiting until it has been taken.
    ///
    /// # Errors
    ///
    /// Returns [`Closed`] if the receiver was dropped before taking the value.
    pub async fn send(&self, value: T) -> Result<(), Closed> {
        let (taken, ack) = oneshot::channel();
        self.inner
            .send(Handoff { value, taken })
            .await
            .map_err(|_| Closed)?;
        ack.await.map_err(|_| Closed)
    }

    /// Returns `true` once the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> RendezvousReceiver<T> {
    /// Takes the next value, releasing the waiting sender.
    ///
    /// Returns `None` once the sender has been dropped. Cancel-safe.
    pub async fn recv(&mut self) -> Option<T> {
        let Handoff { value, taken } = self.inner.recv().await?;
        // The sender may have given up waiting; the value is still ours.
        let _ = taken.send(());
        Some(value)
    }

    /// Closes the channel; pending and future sends fail with [`Closed`].
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl<T> std::fmt::Debug for RendezvousSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> std::fmt::Debug for RendezvousReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousReceiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_send_waits_for_receiver() {
        let (tx, mut rx) = channel::<u32>();
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&delivered);

        let sender = tokio::spawn(async move {
            tx.send(7).await.unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            !delivered.load(Ordering::SeqCst),
            "send completed before anyone received"
        );

        assert_eq!(rx.recv().await, Some(7));
        sender.await.unwrap();
        assert!(delivered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_recv_none_after_sender_dropped() {
        let (tx, mut rx) = channel::<u32>();
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, rx) = channel::<u32>();
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(1).await, Err(Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_send_fails_when_receiver_closes() {
        let (tx, mut rx) = channel::<u32>();
        let sender = tokio::spawn(async move { tx.send(1).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        rx.close();
        drop(rx);

        assert_eq!(sender.await.unwrap(), Err(Closed));
    }

    #[tokio::test]
    async fn test_values_arrive_in_order() {
        let (tx, mut rx) = channel::<u32>();
        let sender = tokio::spawn(async move {
            for i in 0..5 {
                tx.send(i).await.unwrap();
            }
        });

        let mut got = Vec::new();
        while let Some(v) = rx.recv().await {
            got.push(v);
        }
        sender.await.unwrap();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }
}
