//! Task module
//!
//! This module contains task-related types, storage and lifecycle logic.

mod model;
mod repository;
mod service;
mod sqlite_store;

pub use model::*;
pub use repository::TaskRepository;
pub use service::TaskService;
pub use sqlite_store::SqliteTaskStore;
