//! Core library for the Task Manager
//!
//! This crate contains the task domain model, the relational task store
//! and the service layer that exposes the task lifecycle verbs.

pub mod error;
pub mod task;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
