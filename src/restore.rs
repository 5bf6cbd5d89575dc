//! Restore path: stored object in, original dump out.
//!
//! The inverse pipeline runs synchronously - restore is a one-shot
//! operation on a single stream, so there is nothing to overlap:
//!
//! ```text
//! object bytes -> [nonce-consuming decrypt] -> zstd decode -> sink
//! ```
//!
//! Whether to decrypt is decided by the caller (key configured or not);
//! the stored bytes carry no marker beyond the object-key suffix.

use std::io::{self, Read, Write};

use crate::crypto::{CipherReader, KeyMaterial};
use crate::error::{Error, Result};
use crate::pipeline::compress;

/// Stream `input` through decryption (when `key` is given) and
/// decompression into `output`. Returns the number of plaintext bytes
/// written.
pub fn restore<R, W>(input: R, output: &mut W, key: Option<&KeyMaterial>) -> Result<u64>
where
    R: Read,
    W: Write,
{
    let reader: Box<dyn Read> = match key {
        Some(key) => Box::new(CipherReader::new(input, key)?),
        None => Box::new(input),
    };

    let mut decoder = compress::decoder(reader)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                output.write_all(&buf[..n])?;
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::TruncatedStream(
                    "compressed stream ended before the final frame",
                ));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{random_nonce, Keystream, NONCE_LEN};
    use std::io::Cursor;

    fn key() -> KeyMaterial {
        KeyMaterial::new(b"0123456789abcdef".to_vec()).unwrap()
    }

    fn stored_object(plaintext: &[u8], key: Option<&KeyMaterial>) -> Vec<u8> {
        let compressed = zstd::encode_all(plaintext, 0).unwrap();
        match key {
            Some(key) => {
                let nonce = random_nonce().unwrap();
                let mut ciphertext = compressed;
                Keystream::new(key, &nonce).unwrap().apply(&mut ciphertext);

                let mut object = nonce.to_vec();
                object.extend_from_slice(&ciphertext);
                object
            }
            None => compressed,
        }
    }

    #[test]
    fn restores_encrypted_objects() {
        let key = key();
        let plaintext = b"SELECT * FROM users;".repeat(100);
        let object = stored_object(&plaintext, Some(&key));

        let mut out = Vec::new();
        let written = restore(Cursor::new(object), &mut out, Some(&key)).unwrap();
        assert_eq!(out, plaintext);
        assert_eq!(written, plaintext.len() as u64);
    }

    #[test]
    fn restores_plain_objects() {
        let plaintext = b"SELECT 1;";
        let object = stored_object(plaintext, None);

        let mut out = Vec::new();
        restore(Cursor::new(object), &mut out, None).unwrap();
        assert_eq!(out, plaintext.as_slice());
    }

    #[test]
    fn empty_dump_restores_to_empty() {
        let key = key();
        let object = stored_object(b"", Some(&key));

        let mut out = Vec::new();
        restore(Cursor::new(object), &mut out, Some(&key)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn missing_nonce_is_truncated_stream() {
        let key = key();
        let result = restore(
            Cursor::new(vec![0u8; NONCE_LEN - 1]),
            &mut Vec::new(),
            Some(&key),
        );
        assert!(matches!(result, Err(Error::TruncatedStream(_))));
    }

    #[test]
    fn truncated_tail_is_an_error() {
        let plaintext = b"dump that will be cut short ".repeat(200);
        let mut object = stored_object(&plaintext, None);
        object.truncate(object.len() - 16);

        let result = restore(Cursor::new(object), &mut Vec::new(), None);
        assert!(result.is_err(), "truncated archive must not restore cleanly");
    }

    #[test]
    fn wrong_key_does_not_restore() {
        let right = key();
        let wrong = KeyMaterial::new(b"fedcba9876543210".to_vec()).unwrap();
        let object = stored_object(b"secret dump", Some(&right));

        // Decrypting with the wrong key yields garbage, which zstd rejects.
        let result = restore(Cursor::new(object), &mut Vec::new(), Some(&wrong));
        assert!(result.is_err());
    }
}
