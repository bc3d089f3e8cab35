//! Structured logging utilities
//!
//! Business events emitted with an `event` field so that log pipelines can
//! filter operation audit and schedule events.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    /// Operation audit: who changed which entity
    pub fn log_operation(entity: &str, id: i64, action: &str, actor_id: i64) {
        info!(
            event = "operation",
            entity = entity,
            entity.id = id,
            action = action,
            actor.id = actor_id,
            "{} {} by user {}",
            entity,
            action,
            actor_id
        );
    }

    pub fn log_job_fire_out_of_window(
        job_id: i64,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cron_expression: &str,
    ) {
        warn!(
            event = "job_out_of_window",
            job.id = job_id,
            now = %now,
            job.start = %start,
            job.end = %end,
            job.cron = cron_expression,
            "ScheduleJob({}) current time is not within the planned execution time",
            job_id
        );
    }

    pub fn log_unknown_job_type(job_id: i64, job_type: &str) {
        warn!(
            event = "job_unknown_type",
            job.id = job_id,
            job.type = job_type,
            "Unknown job type {}, jobId: {}",
            job_type,
            job_id
        );
    }

    pub fn log_job_execution_complete(
        job_id: i64,
        job_type: &str,
        success: bool,
        duration_ms: u64,
        error_message: Option<&str>,
    ) {
        if success {
            info!(
                event = "job_execution_complete",
                job.id = job_id,
                job.type = job_type,
                job.duration_ms = duration_ms,
                "Job execution completed successfully"
            );
        } else {
            error!(
                event = "job_execution_failed",
                job.id = job_id,
                job.type = job_type,
                job.duration_ms = duration_ms,
                job.error = error_message.unwrap_or("Unknown error"),
                "Job execution failed"
            );
        }
    }

    pub fn log_dispatch_rejected(job_id: i64, reason: &str) {
        warn!(
            event = "job_dispatch_rejected",
            job.id = job_id,
            reason = reason,
            "Job dispatch rejected"
        );
    }

    pub fn log_invalidation(handler: &str, correlation_id: &str, origin: &str, published: bool) {
        let (event, direction) = if published {
            ("invalidation_published", "published")
        } else {
            ("invalidation_received", "received")
        };
        info!(
            event = event,
            handler = handler,
            correlation_id = correlation_id,
            origin = origin,
            "Cluster invalidation {}",
            direction
        );
    }
}
