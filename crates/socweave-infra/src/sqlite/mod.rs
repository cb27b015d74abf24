//! SQLite persistence: pooling and the run repository.

pub mod pool;
pub mod run;

pub use pool::DatabasePool;
pub use run::SqliteRunRepository;
