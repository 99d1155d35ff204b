//! Shared layer: models used by every feature of the crate.

pub mod models;
