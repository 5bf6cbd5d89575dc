//! zstd compression stage.
//!
//! The `zstd` encoder is synchronous, so this stage runs on a blocking
//! thread (`tokio::task::spawn_blocking`) and bridges the async channels
//! with `blocking_recv` / `blocking_send`. `Encoder::finish` runs on every
//! successful exit so the frame trailer is written before the downstream
//! endpoint is released; without it the archive is unreadable.

use std::io::{self, Read, Write};

use bytes::Bytes;

use super::channel::{ChunkReceiver, ChunkSender};
use crate::error::{Error, Result};

/// Adapts a chunk sender into the `Write` the zstd encoder wants.
struct ChunkWriter {
    tx: ChunkSender,
}

impl Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "downstream stage closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compress everything from `rx` into `tx` as a single zstd stream.
///
/// Must run on a blocking thread. A downstream close surfaces as
/// [`Error::PipeClosed`] so the orchestrator can tell the shutdown cascade
/// apart from a genuine compression failure.
pub fn compress_stream(mut rx: ChunkReceiver, tx: ChunkSender) -> Result<()> {
    let writer = ChunkWriter { tx };
    let mut encoder =
        zstd::stream::write::Encoder::new(writer, zstd::DEFAULT_COMPRESSION_LEVEL).map_err(map_io)?;

    while let Some(chunk) = rx.blocking_recv() {
        encoder.write_all(&chunk).map_err(map_io)?;
    }

    encoder.finish().map_err(map_io)?;
    Ok(())
}

fn map_io(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Error::PipeClosed
    } else {
        Error::Io(e)
    }
}

/// Decompressing reader for the restore path.
///
/// Truncated input surfaces as a read error rather than a short result;
/// the caller maps it to a typed error.
pub fn decoder<R: Read>(input: R) -> Result<zstd::stream::read::Decoder<'static, io::BufReader<R>>> {
    Ok(zstd::stream::read::Decoder::new(input)?)
}
