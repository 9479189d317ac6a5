//! HTTP collaborators for the statement import workflow
//!
//! [`HttpStatementApi`] implements [`statement_core::StatementApi`] against the
//! `/api/v1` endpoints; [`ClientConfig`] carries the base URL, credentials and
//! timeout.

pub mod config;
pub mod error;
pub mod http;

pub use config::ClientConfig;
pub use error::ClientError;
pub use http::HttpStatementApi;
