//! Kubernetes collaborators: pod discovery and in-pod command execution.
//!
//! The dump command runs through the exec subresource (`sh -c <command>`),
//! so it works against any image with a POSIX shell. Stdout feeds the
//! pipeline; stderr is logged as it arrives. The exec status frame is read
//! after stdout is exhausted, which is how a non-zero exit surfaces.

use async_trait::async_trait;
use bytes::Bytes;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{AttachParams, ListParams};
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::pipeline::{BackupJob, ChunkSender, DumpSource, EXEC_CHUNK_SIZE};

/// Pod lookup and exec against one cluster.
#[derive(Clone)]
pub struct PodExec {
    client: Client,
}

impl PodExec {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Running pods matching `selector`, across all namespaces. Pods in
    /// any other phase are skipped; there is nothing to dump from them.
    pub async fn running_pods(&self, selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        Ok(list.into_iter().filter(is_running).collect())
    }
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

#[async_trait]
impl DumpSource for PodExec {
    async fn dump(&self, job: &BackupJob, tx: ChunkSender) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &job.namespace);

        let mut params = AttachParams::default()
            .stdin(false)
            .stdout(true)
            .stderr(true);
        if let Some(container) = &job.container {
            params = params.container(container);
        }

        tracing::info!(
            namespace = %job.namespace,
            pod = %job.pod,
            container = job.container.as_deref().unwrap_or(""),
            "exec start"
        );

        let mut attached = pods
            .exec(&job.pod, ["sh", "-c", job.command.as_str()], &params)
            .await?;

        let stdout = attached.stdout().ok_or_else(|| Error::Execution {
            pod: job.pod_ref(),
            message: "exec returned no stdout stream".into(),
        })?;
        let stderr_task = attached
            .stderr()
            .map(|stream| tokio::spawn(forward_stderr(stream, job.pod_ref())));
        let status = attached.take_status();

        let copied = copy_stdout(stdout, &tx).await;
        if copied.is_err() {
            // Downstream collapsed mid-stream. Nobody will drain the
            // command's output, so waiting for its exit status could hang;
            // drop the session instead and let the cascade finish.
            if let Some(task) = stderr_task {
                task.abort();
            }
            drop(attached);
            return copied;
        }

        let status = match status {
            Some(fut) => fut.await,
            None => None,
        };
        attached.join().await.map_err(|e| Error::Execution {
            pod: job.pod_ref(),
            message: format!("exec transport error: {e}"),
        })?;

        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        copied?;

        if let Some(status) = status {
            if status.status.as_deref() == Some("Failure") {
                let message = status
                    .message
                    .or(status.reason)
                    .unwrap_or_else(|| "command failed".into());
                return Err(Error::Execution {
                    pod: job.pod_ref(),
                    message,
                });
            }
        }

        Ok(())
    }
}

async fn copy_stdout(mut stdout: impl AsyncRead + Unpin, tx: &ChunkSender) -> Result<()> {
    let mut buf = vec![0u8; EXEC_CHUNK_SIZE];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        tx.send(Bytes::copy_from_slice(&buf[..n]))
            .await
            .map_err(|_| Error::PipeClosed)?;
    }
}

async fn forward_stderr(mut stderr: impl AsyncRead + Unpin, pod: String) {
    let mut buf = vec![0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                tracing::warn!(pod = %pod, stderr = %text.trim_end(), "remote command stderr");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;

    fn pod_in_phase(phase: Option<&str>) -> Pod {
        Pod {
            status: phase.map(|p| PodStatus {
                phase: Some(p.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn only_running_pods_are_eligible() {
        assert!(is_running(&pod_in_phase(Some("Running"))));
        assert!(!is_running(&pod_in_phase(Some("Pending"))));
        assert!(!is_running(&pod_in_phase(Some("Succeeded"))));
        assert!(!is_running(&pod_in_phase(Some("Failed"))));
        assert!(!is_running(&pod_in_phase(None)));
    }
}
