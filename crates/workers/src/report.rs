//! CPU-heavy report generation.
//!
//! Jobs arrive on `report_job_queue`. The hashing loop runs on the blocking
//! thread pool, with at most [`ReportSettings::workers`] jobs computing at
//! once so the async runtime stays responsive for other consumers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use broker::EventPublisher;
use common::prefixed_id;
use common::topology::{REPORT_GENERATED_QUEUE, REPORT_JOB_QUEUE};
use consumer::{Handler, HandlerError, ServiceContext};
use events::{GenerateReportJob, ReportGenerated};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::error::{Result, WorkerError};

const HASH_SEED: &[u8] = b"compute_hash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSettings {
    /// How long each job keeps hashing.
    pub duration: Duration,
    /// Jobs computing concurrently.
    pub workers: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            workers: 4,
        }
    }
}

/// Repeatedly SHA-256 hashes a seed until `duration` has elapsed.
///
/// Always performs at least one round. Returns the hex digest and the
/// number of rounds.
pub fn compute_report_hash(duration: Duration) -> (String, u64) {
    let started = Instant::now();
    let mut digest = Sha256::digest(HASH_SEED);
    let mut iterations = 1_u64;
    while started.elapsed() < duration {
        digest = Sha256::digest(digest);
        iterations += 1;
    }
    (format!("{digest:x}"), iterations)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Queued,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResult {
    pub job_id: String,
    pub report_type: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    reports: Arc<RwLock<HashMap<String, ReportResult>>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<ReportResult> {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    fn put(&self, report: ReportResult) {
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(report.job_id.clone(), report);
    }
}

#[derive(Debug, Clone)]
pub struct ReportWorker {
    settings: ReportSettings,
    pool: Arc<Semaphore>,
    store: ReportStore,
}

impl ReportWorker {
    pub fn new(settings: ReportSettings, store: ReportStore) -> Self {
        Self {
            settings,
            pool: Arc::new(Semaphore::new(settings.workers.max(1))),
            store,
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Records a queued job and publishes it. Returns the `job_` id.
    #[tracing::instrument(skip(self, publisher))]
    pub async fn submit(&self, publisher: &EventPublisher, report_type: &str) -> Result<String> {
        let job_id = prefixed_id("job");
        self.store.put(ReportResult {
            job_id: job_id.clone(),
            report_type: report_type.to_string(),
            status: ReportStatus::Queued,
            report_hash: None,
            duration_seconds: None,
            iterations: None,
        });
        publisher
            .send(REPORT_JOB_QUEUE, &GenerateReportJob::new(job_id.clone(), report_type))
            .await?;
        tracing::info!(job_id = %job_id, "report job queued");
        Ok(job_id)
    }

    #[tracing::instrument(skip(self, publisher, job), fields(job_id = %job.job_id, report_type = %job.report_type))]
    pub async fn generate(&self, publisher: &EventPublisher, job: &GenerateReportJob) -> Result<ReportResult> {
        let permit = Arc::clone(&self.pool)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::PoolClosed)?;

        let started = Instant::now();
        let duration = self.settings.duration;
        let (report_hash, iterations) = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            compute_report_hash(duration)
        })
        .await
        .map_err(|e| WorkerError::Report {
            job_id: job.job_id.clone(),
            reason: e.to_string(),
        })?;
        let elapsed = started.elapsed().as_secs_f64();

        let report = ReportResult {
            job_id: job.job_id.clone(),
            report_type: job.report_type.clone(),
            status: ReportStatus::Completed,
            report_hash: Some(report_hash.clone()),
            duration_seconds: Some(elapsed),
            iterations: Some(iterations),
        };
        self.store.put(report.clone());

        publisher
            .send(
                REPORT_GENERATED_QUEUE,
                &ReportGenerated::new(job.job_id.clone(), report_hash, elapsed),
            )
            .await?;

        tracing::info!(duration_seconds = elapsed, iterations, "report generated");
        metrics::histogram!("report_generation_seconds").record(elapsed);
        Ok(report)
    }
}

#[async_trait]
impl Handler<GenerateReportJob> for ReportWorker {
    fn name(&self) -> &'static str {
        "report_generate"
    }

    async fn handle(&self, job: GenerateReportJob, ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        self.generate(ctx.publisher(), &job).await?;
        Ok(())
    }
}
