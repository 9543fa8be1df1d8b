//! Common library for the Memo Board services
//!
//! This crate provides shared functionality used across the services of the
//! workspace: PostgreSQL connectivity, the store error type and the tracing
//! bootstrap.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     common::telemetry::init_tracing()?;
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     assert!(health_check(&pool).await?);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod telemetry;
