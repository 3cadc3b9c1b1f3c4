#![deny(warnings)]
#![deny(unused_imports)]

//! kbchat-pipeline
//!
//! Request orchestration: language normalization, scope guard, grounded
//! retrieval, prompt construction, generation, localization and telemetry.

pub mod generation;
pub mod guard;
pub mod language;
pub mod pipeline;
pub mod prompt;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod translator;

pub use pipeline::{ChatReply, Collaborators, Flow, IntentView, Pipeline, Turn};
pub use prompt::{Citation, REFUSAL, TEMPORARY_ISSUE};
pub use telemetry::TelemetryGuard;
