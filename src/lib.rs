pub mod aggregation;
pub mod cache;
pub mod cache_keys;
pub mod configuration;
pub mod error;
pub mod handler;
pub mod helpers;
pub mod model;
pub mod provider;
pub mod service;
pub mod types;
