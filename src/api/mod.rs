//! REST API module.
//!
//! Contains all API routes and handlers following the frontend contract.
//! Success bodies are the entities themselves; errors map through
//! [`crate::errors::AppError`].

mod meetings;
mod tasks;

pub use meetings::*;
pub use tasks::*;

use serde::Serialize;

/// Body returned by DELETE endpoints.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

impl DeleteResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
