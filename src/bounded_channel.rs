// SPDX-License-Identifier: Apache-2.0

//! Bounded async channel used to hand acknowledgement results to the
//! offset committer.

use flume::{Receiver, Sender};
use std::fmt;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    /// Send an item, waiting for capacity.
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| SendError::Disconnected)
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    /// Receive the next item, or `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);
    (BoundedSender { tx }, BoundedReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::{SendError, bounded};
    use tokio_test::{assert_ok, assert_pending, assert_ready, task::spawn};

    #[tokio::test]
    async fn receive_after_send() {
        let (tx, mut rx) = bounded(2);

        let mut recv = spawn(async { rx.next().await });
        assert_pending!(recv.poll());

        assert_ok!(tx.send("checkpoint").await);
        assert!(recv.is_woken());
        assert_eq!(Some("checkpoint"), assert_ready!(recv.poll()));
    }

    #[tokio::test]
    async fn closed_after_senders_dropped() {
        let (tx, mut rx) = bounded::<u64>(1);
        let tx2 = tx.clone();
        drop(tx);
        drop(tx2);

        assert_eq!(None, rx.next().await);
    }

    #[tokio::test]
    async fn full_channel_waits() {
        let (tx, mut rx) = bounded(1);
        assert_ok!(tx.send(1).await);

        let mut send = spawn(async { tx.send(2).await });
        assert_pending!(send.poll());

        assert_eq!(Some(1), rx.next().await);
        assert_ok!(assert_ready!(send.poll()));
        assert_eq!(Some(2), rx.next().await);
    }

    #[tokio::test]
    async fn send_fails_without_receiver() {
        let (tx, rx) = bounded(1);
        drop(rx);

        assert_eq!(Err(SendError::Disconnected), tx.send(1).await);
    }
}
