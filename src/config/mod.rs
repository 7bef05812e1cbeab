//! Configuration module for Catalog-Probe
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_probe::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("catalog-probe.toml")).unwrap();
//! println!("Checks per second: {}", config.crawler.check_rate_limit);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    AgencyEntry, Config, CrawlerConfig, HttpConfig, StorageConfig, UserAgentConfig,
    ValidationConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
