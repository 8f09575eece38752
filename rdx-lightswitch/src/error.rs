//! Error types for configuration, transport, scene access and plugin loading.

use thiserror::Error;

/// Errors raised while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required parameter <{0}>")]
    MissingParameter(&'static str),

    #[error("failed to load configuration")]
    Load(#[from] config::ConfigError),
}

/// Errors raised by the topic registry.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid topic name '{0}': topics must start with '/'")]
    InvalidTopic(String),

    #[error("topic '{topic}' already carries a different message type")]
    TypeMismatch { topic: String },

    #[error("no async runtime available to deliver messages on '{0}'")]
    NoRuntime(String),
}

/// Errors raised when a non-owning scene reference is dereferenced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("the scene has been torn down")]
    SceneDropped,

    #[error("light '{0}' no longer exists in the scene")]
    LightRemoved(String),

    #[error("a light named '{0}' already exists")]
    DuplicateLight(String),
}

/// Errors raised while loading a plugin. A plugin that fails to load is never
/// constructed, so it stays inert for the rest of the run.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no {0} specified, plugin won't load")]
    MissingHandle(&'static str),

    #[error("no light named '{0}' found, plugin won't load")]
    LightNotFound(String),

    #[error("unknown plugin library '{0}'")]
    UnknownPlugin(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
