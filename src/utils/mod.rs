//! Shared helpers for the controller binary and reconciler.

pub mod bootstrap;
pub mod retry;
