//! Core library for the frank orchestration core -- shared types, the
//! component error taxonomy, configuration loading, and the atomic-write
//! primitive used by every filesystem-backed component.

pub mod atomic_io;
pub mod config;
pub mod error;
pub mod types;

pub use error::CoreError;
