//! Configuration loading and validation.
//!
//! Config file: `concierge.toml`, searched in `./` then the user config
//! directory. Environment variables (the deployment's canonical source)
//! override file values; see [`loader::apply_env_overrides`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        BackendConfig, BusinessConfig, ConciergeConfig, GatingConfig, RateLimitConfig,
        ReplyTexts, ServerConfig, SessionConfig, SidecarConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
