#![deny(missing_docs)]

//! Core library for the Rusty Reader document analysis service.

/// Segmentation, sampling, two-stage summarization, and run orchestration.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Document source collaborator and the on-disk document cache.
pub mod documents;
/// Persistent analysis job records.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Analysis run counters.
pub mod metrics;
/// Clients for the external summarization service.
pub mod summarization;
