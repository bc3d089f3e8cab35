pub mod coordination;
pub mod data_store;
pub mod database;
pub mod observability;

pub use coordination::*;
pub use data_store::*;
pub use database::*;
pub use observability::*;
