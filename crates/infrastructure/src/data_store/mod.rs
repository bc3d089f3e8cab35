pub mod sqlx_driver;

pub use sqlx_driver::{SqlxDataStoreDriver, SqlxDataStorePool};
