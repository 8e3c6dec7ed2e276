//! Runtime configuration.

pub mod settings;

pub use settings::{SettingsProvider, Settings, SharedSettings};
