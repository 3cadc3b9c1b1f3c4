#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! kbchat-core
//!
//! Shared vocabulary of the chat service: request/response domain types, the
//! collaborator traits, the error taxonomy and the Figment-backed settings.

pub mod config;
pub mod data_processor;
pub mod deadline;
pub mod error;
pub mod traits;
pub mod types;
