// ABOUTME: Shared configuration for the Pairroom server
// ABOUTME: Environment variable names, defaults, and the validated server Config

pub mod constants;
pub mod env;

mod config;

pub use config::{Config, ConfigError, ExecutionLimits};
