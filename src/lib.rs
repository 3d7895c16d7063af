//! Sequential multi-party document signing with a hash-chained evidence log.

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod evidence;
pub mod sequencing;
pub mod service;
pub mod store;
pub mod timestamp;
pub mod utils;
pub mod workflow;
