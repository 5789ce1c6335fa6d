//! Submission, retry and completion polling for content processed by a
//! remote graph service.
//!
//! [`JobOrchestrator`] owns the pipeline. [`JobOrchestrator::submit`] and
//! [`JobOrchestrator::request_chapters`] add work; [`JobOrchestrator::run_once`]
//! and [`JobOrchestrator::start`] move it along. Progress is observed through
//! the [`store::JobStore`].

pub mod config;
pub mod dedup;
pub mod error;
pub mod materialize;
pub mod orchestrator;
pub mod remote;
pub mod retry;
pub mod state_machine;
pub mod store;
pub mod submission;
pub mod upload;

pub use config::RelayConfig;
pub use error::RelayError;
pub use orchestrator::{JobOrchestrator, RunSummary};
pub use submission::ChapterRequest;
