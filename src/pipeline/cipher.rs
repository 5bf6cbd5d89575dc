//! Encryption stage.
//!
//! Emits a fresh random nonce as the first chunk, then XORs the AES-CTR
//! keystream over every payload chunk in place. The nonce is written
//! uncompressed and unencrypted; restore consumes it before decrypting.

use bytes::{Bytes, BytesMut};

use super::channel::{ChunkReceiver, ChunkSender};
use crate::crypto::{random_nonce, KeyMaterial, Keystream};
use crate::error::{Error, Result};

/// Encrypt every chunk from `rx` into `tx`, nonce first.
pub async fn encrypt_stream(
    mut rx: ChunkReceiver,
    tx: ChunkSender,
    key: &KeyMaterial,
) -> Result<()> {
    let nonce = random_nonce()?;
    let mut keystream = Keystream::new(key, &nonce)?;

    tx.send(Bytes::copy_from_slice(&nonce))
        .await
        .map_err(|_| Error::PipeClosed)?;

    while let Some(chunk) = rx.recv().await {
        let mut buf = BytesMut::from(chunk.as_ref());
        keystream.apply(&mut buf);
        tx.send(buf.freeze()).await.map_err(|_| Error::PipeClosed)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherReader, NONCE_LEN};
    use crate::pipeline::channel::chunk_channel;
    use std::io::{Cursor, Read};

    async fn encrypt_all(plaintext: &[u8], key: &KeyMaterial) -> Vec<u8> {
        let (in_tx, in_rx) = chunk_channel();
        let (out_tx, mut out_rx) = chunk_channel();

        let key = key.clone();
        let stage = tokio::spawn(async move { encrypt_stream(in_rx, out_tx, &key).await });

        let feed = plaintext.to_vec();
        let feeder = tokio::spawn(async move {
            for chunk in feed.chunks(5) {
                if in_tx.send(Bytes::copy_from_slice(chunk)).await.is_err() {
                    break;
                }
            }
        });

        let mut out = Vec::new();
        while let Some(chunk) = out_rx.recv().await {
            out.extend_from_slice(&chunk);
        }

        feeder.await.unwrap();
        stage.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn output_is_nonce_plus_ciphertext() {
        let key = KeyMaterial::new(b"0123456789abcdef".to_vec()).unwrap();
        let plaintext = b"SELECT 1;";

        let stored = encrypt_all(plaintext, &key).await;
        assert_eq!(stored.len(), NONCE_LEN + plaintext.len());
        assert_ne!(&stored[NONCE_LEN..], plaintext.as_slice());

        let mut reader = CipherReader::new(Cursor::new(stored), &key).unwrap();
        let mut recovered = Vec::new();
        reader.read_to_end(&mut recovered).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[tokio::test]
    async fn each_stream_gets_its_own_nonce() {
        let key = KeyMaterial::new(b"0123456789abcdef".to_vec()).unwrap();

        let first = encrypt_all(b"same plaintext", &key).await;
        let second = encrypt_all(b"same plaintext", &key).await;
        assert_ne!(
            first[..NONCE_LEN],
            second[..NONCE_LEN],
            "nonce must be fresh per stream"
        );
        assert_ne!(first[NONCE_LEN..], second[NONCE_LEN..]);
    }

    #[tokio::test]
    async fn empty_payload_still_writes_nonce() {
        let key = KeyMaterial::new(b"0123456789abcdef".to_vec()).unwrap();
        let stored = encrypt_all(b"", &key).await;
        assert_eq!(stored.len(), NONCE_LEN);
    }
}
