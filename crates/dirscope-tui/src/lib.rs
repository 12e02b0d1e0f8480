/// dirscope terminal dashboard.
///
/// This crate owns the terminal: the dashboard state machine, frame drawing,
/// the event loop, the run context and the concrete deletion collaborator.
/// Scanning, caching and metrics live in `dirscope-core`.
pub mod app;
pub mod context;
pub mod engine;
pub mod render;
pub mod state;
pub mod theme;

pub use app::run;
pub use context::RunContext;
pub use engine::FsDeletionEngine;
pub use state::Dashboard;
