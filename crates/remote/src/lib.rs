//! HTTP client for the field-data service.
//!
//! Implements [`fieldsync_core::remote::RemoteDataService`] over the REST
//! delta/upsert endpoints.

pub mod client;
pub mod error;
pub mod types;

pub use client::FieldDataClient;
pub use error::{RemoteClientError, Result};
pub use types::{ApiErrorResponse, ChangesResponse, HealthResponse};
