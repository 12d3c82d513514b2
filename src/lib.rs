//! # StudyConnect
//!
//! A task and study-group collaboration backend, usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! studyconnect = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use studyconnect::server::{AppState, create_router};
//! use studyconnect::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/studyconnect.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store)));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the binary's CLI. Disable with
//!   `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod rules;
pub mod server;
pub mod store;
pub mod types;
pub mod views;
