//! Batch orchestration.
//!
//! Targets are processed in config order; within a target, one pipeline
//! per running pod, sequentially. A failed job is recorded and the batch
//! moves on - retry policy belongs to whatever schedules the process
//! (a CronJob, typically). A short fixed delay between jobs keeps a large
//! cluster from hammering the apiserver's exec path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kube::ResourceExt;

use crate::config::{BackupTarget, Config};
use crate::crypto::KeyMaterial;
use crate::error::Error;
use crate::k8s::PodExec;
use crate::pipeline::{job, BackupJob, DumpSource, JobState, ObjectSink};

/// Pacing delay between consecutive jobs. Not a backoff policy.
pub const JOB_PACING: Duration = Duration::from_secs(1);

/// Outcome of one job, for the end-of-run summary.
#[derive(Debug)]
pub struct JobReport {
    pub namespace: String,
    pub pod: String,
    pub object_key: String,
    pub state: JobState,
    pub error: Option<Error>,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub jobs: Vec<JobReport>,
    /// Targets whose pod listing failed outright.
    pub target_errors: usize,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Failed)
            .count()
    }

    pub fn any_failed(&self) -> bool {
        self.failed() > 0 || self.target_errors > 0
    }
}

pub struct Runner {
    pods: PodExec,
    sink: Arc<dyn ObjectSink>,
    key: Option<KeyMaterial>,
}

impl Runner {
    pub fn new(pods: PodExec, sink: Arc<dyn ObjectSink>, key: Option<KeyMaterial>) -> Self {
        Self { pods, sink, key }
    }

    pub async fn run(&self, config: &Config) -> RunSummary {
        let mut summary = RunSummary::default();
        let date = Utc::now().format("%Y-%m-%d").to_string();

        for target in &config.backup_types {
            let pods = match self.pods.running_pods(&target.label_selector).await {
                Ok(pods) => pods,
                Err(e) => {
                    tracing::error!(
                        selector = %target.label_selector,
                        error = %e,
                        "failed to list pods"
                    );
                    summary.target_errors += 1;
                    continue;
                }
            };

            if pods.is_empty() {
                tracing::warn!(selector = %target.label_selector, "no running pods matched");
            }

            for pod in &pods {
                let job = self.job_for(pod, target, &date);
                summary.jobs.push(self.run_job(job).await);
                tokio::time::sleep(JOB_PACING).await;
            }
        }

        summary
    }

    async fn run_job(&self, job: BackupJob) -> JobReport {
        let mut report = JobReport {
            namespace: job.namespace.clone(),
            pod: job.pod.clone(),
            object_key: job.object_key.clone(),
            state: JobState::Running,
            error: None,
        };

        tracing::info!(
            namespace = %report.namespace,
            pod = %report.pod,
            key = %report.object_key,
            "backup start"
        );
        let started = Instant::now();

        let source = Arc::new(self.pods.clone()) as Arc<dyn DumpSource>;
        match job::run(source, Arc::clone(&self.sink), self.key.as_ref(), job).await {
            Ok(()) => {
                report.state = JobState::Succeeded;
                tracing::info!(
                    namespace = %report.namespace,
                    pod = %report.pod,
                    key = %report.object_key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "backup complete"
                );
            }
            Err(e) => {
                report.state = JobState::Failed;
                tracing::error!(
                    namespace = %report.namespace,
                    pod = %report.pod,
                    key = %report.object_key,
                    error = %e,
                    "backup failed"
                );
                report.error = Some(e);
            }
        }

        report
    }

    fn job_for(
        &self,
        pod: &k8s_openapi::api::core::v1::Pod,
        target: &BackupTarget,
        date: &str,
    ) -> BackupJob {
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        let name = pod.name_any();
        let encrypt = self.key.is_some();

        BackupJob {
            object_key: object_key(&namespace, &name, &target.suffix, date, encrypt),
            namespace,
            pod: name,
            container: target.container.clone(),
            command: target.command.clone(),
            encrypt,
        }
    }
}

/// `{namespace}/{date}/{pod}{suffix}.zst[.aes]`. The extension chain is
/// how a consumer knows whether to decrypt: the stored bytes do not say.
fn object_key(namespace: &str, pod: &str, suffix: &str, date: &str, encrypted: bool) -> String {
    let mut key = format!("{namespace}/{date}/{pod}{suffix}.zst");
    if encrypted {
        key.push_str(".aes");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_encode_format_and_encryption() {
        assert_eq!(
            object_key("db", "mariadb-0", "-all", "2026-08-05", false),
            "db/2026-08-05/mariadb-0-all.zst"
        );
        assert_eq!(
            object_key("db", "mariadb-0", "", "2026-08-05", true),
            "db/2026-08-05/mariadb-0.zst.aes"
        );
    }
}
