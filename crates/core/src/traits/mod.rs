pub mod coordination;
pub mod data_store;
pub mod executor;
pub mod invalidation;
pub mod permission;
pub mod repository;
pub mod scheduler;

pub use coordination::*;
pub use data_store::*;
pub use executor::*;
pub use invalidation::*;
pub use permission::*;
pub use repository::*;
pub use scheduler::*;
