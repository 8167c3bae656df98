//! Credit card default prediction.
//!
//! Trains a random forest on historical credit card records, persists it
//! together with its scaler and feature schema as a single artifact, and
//! scores new records against that artifact with strict feature validation.

pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;

pub use config::Config;
pub use error::{AppError, Result};
