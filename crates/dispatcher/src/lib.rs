pub mod cron_utils;
pub mod dispatcher;
pub mod executor_registry;
pub mod recovery_service;
pub mod stop_handler;
pub mod trigger_scheduler;

pub use cron_utils::CronScheduler;
pub use dispatcher::{DispatchOutcome, DispatcherHandle, DispatcherOptions, JobDispatcher};
pub use executor_registry::ExecutorRegistry;
pub use recovery_service::{JobRecoveryService, RecoveryReport};
pub use stop_handler::CronJobStopHandler;
pub use trigger_scheduler::CronTriggerScheduler;
