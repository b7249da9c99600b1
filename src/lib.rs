//! Task lists that reward daily completion streaks.
//!
//! [`service::TodoService`] is the entry point: it owns the list and task
//! repositories, runs the streak engine after every task mutation, and
//! reports which cached views each mutation made stale.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod repository;
pub mod service;
pub mod store;
pub mod streak;
pub mod sync;

pub use error::{Error, Result};
pub use service::TodoService;
