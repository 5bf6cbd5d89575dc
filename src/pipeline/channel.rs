//! Chunk channels connecting pipeline stages.
//!
//! Every stage boundary is a bounded `mpsc` channel of [`Bytes`] with a
//! single slot. A second send suspends until the consumer has drained the
//! first, so a slow uploader stalls the compressor, which stalls the remote
//! command, without unbounded buffering in between.
//!
//! Shutdown rides on ownership: each stage owns the endpoints handed to it
//! and releases them when its function returns, on success, error, or
//! panic alike. Dropping a sender makes the receiver observe end-of-stream
//! (`recv() == None`); dropping a receiver makes further sends fail. That
//! is the whole cancellation story - a failing stage releases its
//! endpoints and every adjacent stage unblocks and fails in turn.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Slots per stage boundary. One slot keeps producer and consumer in
/// near-lockstep; raising it only adds latency tolerance, not throughput.
pub const PIPE_CHANNEL_SIZE: usize = 1;

/// Read size used when draining remote command output.
pub const EXEC_CHUNK_SIZE: usize = 64 * 1024;

/// Producing end of a stage boundary.
pub type ChunkSender = mpsc::Sender<Bytes>;

/// Consuming end of a stage boundary.
pub type ChunkReceiver = mpsc::Receiver<Bytes>;

/// Create one stage boundary.
pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::channel(PIPE_CHANNEL_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn chunks_arrive_in_order() {
        let (tx, mut rx) = chunk_channel();

        tokio::spawn(async move {
            for chunk in [&b"one"[..], b"two", b"three"] {
                tx.send(Bytes::copy_from_slice(chunk)).await.unwrap();
            }
        });

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"three"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_blocks_until_consumer_drains() {
        let (tx, mut rx) = chunk_channel();

        tx.send(Bytes::from_static(b"a")).await.unwrap();

        // Slot is full and nobody is reading: the next send must suspend.
        let blocked = timeout(Duration::from_millis(50), tx.send(Bytes::from_static(b"b"))).await;
        assert!(blocked.is_err(), "send should block while the slot is full");

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        timeout(Duration::from_millis(50), tx.send(Bytes::from_static(b"b")))
            .await
            .expect("send should proceed once the slot is free")
            .unwrap();
    }

    #[tokio::test]
    async fn sender_drop_is_end_of_stream() {
        let (tx, mut rx) = chunk_channel();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn receiver_drop_rejects_writes() {
        let (tx, rx) = chunk_channel();
        drop(rx);
        assert!(tx.send(Bytes::from_static(b"a")).await.is_err());
    }

    #[tokio::test]
    async fn receiver_close_rejects_writes() {
        let (tx, mut rx) = chunk_channel();
        rx.close();
        assert!(tx.send(Bytes::from_static(b"a")).await.is_err());
    }
}
