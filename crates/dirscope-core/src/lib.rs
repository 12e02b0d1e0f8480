/// dirscope core — scanning, aggregation, caching, and system metrics.
///
/// This crate contains all business logic with zero terminal dependencies.
/// The dashboard crate drives it through [`scanner::start_scan`],
/// [`metrics::start_sampler`] and the [`delete::DeletionEngine`] seam.
///
/// # Modules
///
/// - [`model`] — Arena-allocated file tree and supporting types.
/// - [`probe`] — Single-path metadata probe.
/// - [`scanner`] — Bounded parallel walk feeding a single-writer aggregator.
/// - [`cache`] — Subtree cache keyed by identity and mtime.
/// - [`metrics`] — Periodic CPU, memory and disk-I/O sampling.
/// - [`delete`] — Deletion requests and the engine interface.
/// - [`config`] — Startup configuration.
/// - [`error`] — Error and issue taxonomy.
/// - [`platform`] — Unix metadata shims.
pub mod cache;
pub mod config;
pub mod delete;
pub mod error;
pub mod metrics;
pub mod model;
pub mod platform;
pub mod probe;
pub mod scanner;
