#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

//! hookwarden mediates the hook events an AI coding-agent runtime emits:
//! each invocation classifies one event, pairs it with its other half across
//! process boundaries through an embedded store, consults the Policy API,
//! and answers the host with allow, block, or deny.

pub mod audit;
pub mod classify;
pub mod config;
pub mod decision;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod normalize;
pub mod policy;
pub mod state;
pub mod transcript;

pub use config::RunConfig;
pub use decision::Decision;
pub use engine::Mediator;
pub use envelope::HookEnvelope;
pub use error::{Result, WardenError};
