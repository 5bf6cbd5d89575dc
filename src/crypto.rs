//! AES-CTR primitives for backup streams.
//!
//! Counter mode turns AES into a streaming XOR cipher: no padding, no need
//! to know the payload length up front. That matters here because a dump's
//! size is unknown until the remote command exits.
//!
//! Encrypted objects carry a 16-byte random nonce as a literal prefix:
//!
//! ```text
//! [nonce: 16 bytes][keystream XOR payload]
//! ```
//!
//! The nonce is regenerated from the OS RNG on every encryption, so two
//! streams under the same key never share a keystream.

use std::fmt;
use std::io::{self, Read};

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

/// Nonce length: one AES block.
pub const NONCE_LEN: usize = 16;

/// Symmetric key shared read-only by every job in the process.
///
/// Validated once at construction; the pipeline never sees an invalid key.
#[derive(Clone)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            n => Err(Error::InvalidKeyLength(n)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Key bytes must not leak through debug logging.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial({} bytes)", self.0.len())
    }
}

/// A positioned CTR keystream. Applying it twice with the same key and
/// nonce restores the original bytes.
pub struct Keystream(Inner);

enum Inner {
    Aes128(Ctr128BE<Aes128>),
    Aes192(Ctr128BE<Aes192>),
    Aes256(Ctr128BE<Aes256>),
}

impl Keystream {
    pub fn new(key: &KeyMaterial, nonce: &[u8; NONCE_LEN]) -> Result<Self> {
        let key_bytes = key.as_bytes();
        let inner = match key_bytes.len() {
            16 => Inner::Aes128(
                Ctr128BE::new_from_slices(key_bytes, nonce)
                    .map_err(|_| Error::InvalidKeyLength(key_bytes.len()))?,
            ),
            24 => Inner::Aes192(
                Ctr128BE::new_from_slices(key_bytes, nonce)
                    .map_err(|_| Error::InvalidKeyLength(key_bytes.len()))?,
            ),
            32 => Inner::Aes256(
                Ctr128BE::new_from_slices(key_bytes, nonce)
                    .map_err(|_| Error::InvalidKeyLength(key_bytes.len()))?,
            ),
            n => return Err(Error::InvalidKeyLength(n)),
        };
        Ok(Self(inner))
    }

    /// XOR the keystream over `buf` in place, advancing the counter.
    pub fn apply(&mut self, buf: &mut [u8]) {
        match &mut self.0 {
            Inner::Aes128(c) => c.apply_keystream(buf),
            Inner::Aes192(c) => c.apply_keystream(buf),
            Inner::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

/// Fresh random nonce from the OS entropy source.
pub fn random_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.try_fill_bytes(&mut nonce)?;
    Ok(nonce)
}

/// Decrypting reader for the restore path.
///
/// Consumes the 16-byte nonce prefix at construction, then decrypts
/// everything read through it. A source shorter than the nonce is a
/// [`Error::TruncatedStream`], never a short "valid" plaintext.
pub struct CipherReader<R> {
    inner: R,
    keystream: Keystream,
}

impl<R: Read> CipherReader<R> {
    pub fn new(mut inner: R, key: &KeyMaterial) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        inner.read_exact(&mut nonce).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::TruncatedStream("ciphertext shorter than the 16-byte nonce")
            } else {
                Error::Io(e)
            }
        })?;
        let keystream = Keystream::new(key, &nonce)?;
        Ok(Self { inner, keystream })
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.keystream.apply(&mut buf[..n]);
        Ok(n)
    }
}
