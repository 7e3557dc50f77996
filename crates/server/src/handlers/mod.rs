//! HTTP request handlers.

pub mod billing;
pub mod common;
pub mod jobs;

pub use billing::update_tier;
pub use common::health_check;
pub use jobs::{confirm_job, create_job, get_download, get_job, list_jobs};
