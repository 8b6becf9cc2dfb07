mod client;
mod error;

pub use client::{HyphaClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::HyphaError;
