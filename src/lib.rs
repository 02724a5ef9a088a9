//! # DealerSync Ingestion Library
//!
//! This library provides the core functionality for the DealerSync batch
//! ingestion service: the resilient partner API client, per-record-type
//! batch processors, the job queue manager, and the HTTP surface.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod monitor;
pub mod processors;
pub mod queue;
pub mod repositories;
pub mod runner;
pub mod server;
pub mod telemetry;
pub use migration;
