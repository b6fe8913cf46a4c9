//! In-memory job tracking
//!
//! One registry per process, injected into handlers and workers via `AppState`.

pub mod registry;

pub use registry::{JobRegistry, RegistryError};
