//! Application layer: markdown rendering, run controls and the plugin host.

pub mod error;
pub mod plugin;
pub mod render;
pub mod run;
