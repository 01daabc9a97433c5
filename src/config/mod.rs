//! Configuration management
//!
//! Chain parameters (difficulty bounds, reward schedule, selection policy, data
//! directory) loaded from an optional TOML file and environment overrides.

pub mod settings;

pub use settings::{ChainSettings, SelectionMode};
