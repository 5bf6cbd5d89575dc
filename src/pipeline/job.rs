//! Per-job pipeline assembly.
//!
//! One backup job wires four stages together:
//!
//! ```text
//! +-----------+    +------------+    +----------+    +----------+
//! | pod exec  | -> | compressor | -> | [cipher] | -> |  upload  |
//! | (stdout)  |    |   (zstd)   |    | (AES-CTR)|    |  (S3)    |
//! +-----------+    +------------+    +----------+    +----------+
//! ```
//!
//! Producer, compressor and cipher run as independent tasks; the upload is
//! awaited inline so the orchestrator knows when the job has fully
//! resolved. Stage boundaries are single-slot chunk channels, so the chain
//! self-throttles and a failure anywhere tears the rest down through
//! endpoint drops.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::channel::{chunk_channel, ChunkReceiver, ChunkSender};
use super::cipher::encrypt_stream;
use super::compress::compress_stream;
use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};

/// One unit of backup work, built by the pod enumerator and consumed once.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub namespace: String,
    pub pod: String,

    /// Container to exec in; `None` lets the cluster pick the default.
    pub container: Option<String>,

    /// Shell command whose stdout becomes the backup payload.
    pub command: String,

    /// Destination key in the object store.
    pub object_key: String,

    pub encrypt: bool,
}

impl BackupJob {
    /// `namespace/name`, for logs and error messages.
    pub fn pod_ref(&self) -> String {
        format!("{}/{}", self.namespace, self.pod)
    }
}

/// Lifecycle of one job. Terminal states are reported, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Producer collaborator: runs the dump command and feeds its stdout into
/// the pipeline.
///
/// Implementations must drain the command to completion, send every stdout
/// chunk in order, and report a failed execution (non-zero exit, transport
/// error) as an error *after* the stream is exhausted. The sender is owned
/// by the implementation for the duration of the call, so the downstream
/// stage observes end-of-stream on every exit path.
#[async_trait]
pub trait DumpSource: Send + Sync {
    async fn dump(&self, job: &BackupJob, tx: ChunkSender) -> Result<()>;
}

/// Consumer collaborator: drains the pipeline into durable storage.
///
/// Must consume `rx` to end-of-stream and succeed only once storage has
/// accepted every byte under `key`.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn store(&self, key: &str, rx: ChunkReceiver) -> Result<()>;
}

/// Run one job's pipeline to completion and report the first stage error.
///
/// "First" is resolved in pipeline order, skipping the [`Error::PipeClosed`]
/// cascade that a real failure leaves behind in neighbouring stages; the
/// cascade itself is only reported when no stage failed for a concrete
/// reason.
pub async fn run(
    source: Arc<dyn DumpSource>,
    sink: Arc<dyn ObjectSink>,
    key: Option<&KeyMaterial>,
    job: BackupJob,
) -> Result<()> {
    let key = match (job.encrypt, key) {
        (true, Some(key)) => Some(key.clone()),
        (true, None) => {
            return Err(Error::Config(
                "encryption requested but no key material configured".into(),
            ))
        }
        (false, _) => None,
    };

    let (raw_tx, raw_rx) = chunk_channel();
    let (zst_tx, zst_rx) = chunk_channel();

    let producer: JoinHandle<Result<()>> = tokio::spawn({
        let source = Arc::clone(&source);
        let job = job.clone();
        async move { source.dump(&job, raw_tx).await }
    });

    let compressor = tokio::task::spawn_blocking(move || compress_stream(raw_rx, zst_tx));

    let (cipher, upload_rx) = match key {
        Some(key) => {
            let (aes_tx, aes_rx) = chunk_channel();
            let handle = tokio::spawn(async move { encrypt_stream(zst_rx, aes_tx, &key).await });
            (Some(handle), aes_rx)
        }
        None => (None, zst_rx),
    };

    let upload = sink.store(&job.object_key, upload_rx).await;

    let mut results = Vec::with_capacity(4);
    results.push(stage_result(producer).await);
    results.push(stage_result(compressor).await);
    if let Some(handle) = cipher {
        results.push(stage_result(handle).await);
    }
    results.push(upload);

    first_error(results)
}

async fn stage_result(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(result) => result,
        Err(join) => Err(Error::Task(join)),
    }
}

fn first_error(results: Vec<Result<()>>) -> Result<()> {
    let mut cascade = false;
    for result in results {
        match result {
            Err(Error::PipeClosed) => cascade = true,
            Err(e) => return Err(e),
            Ok(()) => {}
        }
    }
    if cascade {
        Err(Error::PipeClosed)
    } else {
        Ok(())
    }
}
