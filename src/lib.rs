//! Academy: an English-academy learning app built around a key-path state
//! store.
//!
//! [`state::KeyPathStore`] holds one JSON document addressed by dotted
//! paths, persists it through a pluggable [`state::Storage`] on every write
//! and notifies path-scoped subscribers. Auth, analytics, progress and the
//! page router keep all their data in that document and are wired together
//! by [`app::AppContext`].

pub mod analytics;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod listeners;
pub mod logger;
pub mod pages;
pub mod progress;
pub mod router;
pub mod state;

pub use app::AppContext;
pub use error::AppError;
pub use state::{KeyPath, KeyPathStore};
