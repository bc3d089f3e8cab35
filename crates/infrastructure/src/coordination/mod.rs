//! 集群协调：协调存储、分布式名称锁与失效通知通道

pub mod in_memory_store;
pub mod invalidation_channel;
pub mod name_lock;
pub mod redis_store;

pub use in_memory_store::InMemoryCoordinationStore;
pub use invalidation_channel::InvalidationChannel;
pub use name_lock::{DistributedNameLock, LockGuard, LockOutcome};
pub use redis_store::RedisCoordinationStore;
