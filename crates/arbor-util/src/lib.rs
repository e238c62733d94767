#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for arbor.
//!
//! This crate provides pure helper functions with no logging/tracing dependencies.
//! Logging is handled by the library and CLI crates that call into it.

pub mod fs;
pub mod hash;
