// src/exec/mod.rs

//! Promotion run execution layer.
//!
//! [`backend`] provides the `ExecutorBackend` trait and the
//! `HostExecutorBackend` used in production, which tests replace with an
//! inline implementation.

pub mod backend;

pub use backend::{ExecutorBackend, HostExecutorBackend};
