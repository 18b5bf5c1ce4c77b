//! Remote fetcher backed by the payment provider's REST API.

pub mod client;
pub mod error;
mod fetcher;

pub use client::{ClientConfig, StripeClient};
pub use error::{ClientError, Result};
