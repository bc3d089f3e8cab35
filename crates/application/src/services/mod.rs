pub mod cron_job_service;
pub mod invalidation;
pub mod name_guard;
pub mod source_service;

pub use cron_job_service::CronJobManager;
pub use invalidation::InvalidationMode;
pub use name_guard::{NameGuard, NameReservation};
pub use source_service::SourceManager;
