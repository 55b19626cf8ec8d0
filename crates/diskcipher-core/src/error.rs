//! Error taxonomy for the diskcipher framework.
//!
//! Each stage of the I/O path has its own error enum so callers can match on
//! exactly the failures that stage produces. [`DiskcipherError`] wraps them all
//! for call sites (configuration loading, provider probe) that span stages.

use diskcipher_provider::HookError;
use thiserror::Error;

/// Registry and configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("algorithm name `{name}` plus suffix `{suffix}` exceeds {max} bytes")]
    NameTooLong {
        name: String,
        suffix: String,
        max: usize,
    },
    #[error("no diskcipher algorithm registered for `{0}`")]
    NotFound(String),
    #[error("diskcipher algorithm `{0}` already registered")]
    DuplicateName(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("provider failed to initialise transform: {0}")]
    ProviderInit(#[source] HookError),
}

/// Key programming failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("provider rejected key: {0}")]
    ProviderRejected(#[source] HookError),
    #[error("transform already keyed for file {bound}; refusing to rebind to {requested}")]
    OwnerConflict { bound: u64, requested: u64 },
}

/// Request binding and consistency failures. Any of these rejects the I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("request carries crypto but has no bound transform")]
    Unbound,
    #[error("transform is keyed for a different file than the request's page")]
    OwnerMismatch,
    #[error("owning file has no valid encryption key")]
    KeyNotReady,
    #[error("request transform no longer matches the file's live transform")]
    StaleBinding,
}

/// Hardware dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("provider hook failed: {0}")]
    ProviderFailed(#[source] HookError),
    #[error("request rejected before dispatch: {0}")]
    Binding(#[from] BindingError),
    #[error("provider does not implement the requested hook")]
    Unsupported,
}

impl From<HookError> for DispatchError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Unsupported => DispatchError::Unsupported,
            other => DispatchError::ProviderFailed(other),
        }
    }
}

/// Umbrella error for operations that span several stages.
#[derive(Debug, Error)]
pub enum DiskcipherError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("toml encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("service not installed")]
    NotInstalled,
    #[error("service already installed")]
    AlreadyInstalled,
}

pub type DiskcipherResult<T> = Result<T, DiskcipherError>;
