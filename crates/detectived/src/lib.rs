//! detectived: daemon hosting a single detective node.
//!
//! The node, its dependencies and its peer endpoints are described in a
//! TOML file (see [`config::DetectiveConfig`]).

pub mod config;

pub use config::{ConfigError, DetectiveConfig};
