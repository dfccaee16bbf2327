//! # lead-enrich
//!
//! Contact verification, churn-risk prediction and buyer-group scoring for CRM
//! records.
//!
//! - `cascade`: ordered multi-provider email and phone verification
//! - `churn`: career-timeline departure risk and refresh tiers
//! - `buyer_group`: company readiness scoring, employee sampling, role tagging
//! - `batch`: bounded-concurrency batch runs with checkpointed resume
//! - `providers`: vendor adapters behind capability traits, wrapped in a
//!   rate/quota/retry guard

pub mod batch;
pub mod buyer_group;
pub mod cascade;
pub mod checkpoint;
pub mod churn;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod providers;
pub mod sink;
pub mod source;
pub mod types;
pub mod utils;

pub use error::{EnrichError, Result};
