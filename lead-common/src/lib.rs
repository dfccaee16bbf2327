//! # lead-common
//!
//! Shared code for the lead enrichment workspace:
//! - Common error type
//! - Configuration loading and root folder resolution
//! - Event types (`EnrichEvent`) and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EnrichEvent, EventBus};
