pub mod adapters;
pub mod config;
pub mod error;
pub mod playback;
pub mod preferences;
pub mod render;
pub mod speech;
