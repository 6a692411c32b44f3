pub mod store;
pub mod types;
pub mod urls;

pub use sqlx::postgres::PgPool;
pub use store::PgStore;
pub use types::*;
