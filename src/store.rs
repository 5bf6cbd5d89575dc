//! Object-storage sink backed by `object_store`.
//!
//! The pipeline hands us chunks; we stream them into a multipart upload
//! with a bounded number of in-flight parts, so memory stays flat no
//! matter how large the dump is. The upload only succeeds once the final
//! part is accepted; a failed upload is aborted so storage is not left
//! holding a half-written object.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};

use crate::error::Result;
use crate::pipeline::{ChunkReceiver, ObjectSink};

/// Upper bound on concurrently buffered multipart parts.
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// S3-compatible sink.
pub struct S3Store {
    store: Arc<dyn ObjectStore>,
}

impl S3Store {
    /// Build from `AWS_*` environment variables plus the bucket and
    /// optional custom endpoint (MinIO and friends use path-style access).
    pub fn from_env(bucket: &str, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }
        if std::env::var("AWS_REGION").is_err() && std::env::var("AWS_DEFAULT_REGION").is_err() {
            builder = builder.with_region("default");
        }
        Ok(Self {
            store: Arc::new(builder.build()?),
        })
    }

    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ObjectSink for S3Store {
    async fn store(&self, key: &str, mut rx: ChunkReceiver) -> Result<()> {
        let path = ObjectPath::from(key);
        let upload = self.store.put_multipart(&path).await?;
        let mut writer = WriteMultipart::new(upload);

        let streamed: Result<()> = async {
            while let Some(chunk) = rx.recv().await {
                writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await?;
                writer.write(&chunk);
            }
            Ok(())
        }
        .await;

        match streamed {
            Ok(()) => {
                writer.finish().await?;
                tracing::debug!(key = %key, "upload complete");
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!(key = %key, error = %abort, "failed to abort upload");
                }
                Err(e)
            }
        }
    }
}
