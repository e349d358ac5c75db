//! Scrapers for the Argentine chambers' voting records, the files they
//! persist, and the forwarder that sends them to the import API.
//!
//! Data flows one way per command: `pipeline::run_listing` writes a year
//! file, `pipeline::run_details` enriches it and writes vote files, and
//! `pipeline::run_import` sends both.

pub mod api;
pub mod config;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod import;
pub mod model;
pub mod outcome;
pub mod pipeline;
pub mod providers;
pub mod store;

pub use error::{Error, Result};
pub use providers::Provider;
