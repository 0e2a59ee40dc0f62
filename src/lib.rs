//! Shared wiring for the swx-events binaries.

pub mod config;
