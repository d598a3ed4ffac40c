use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::value::PropertyKind;

/// Failures raised by the handle bridge and the member dispatcher.
///
/// These cross into Lua as external errors, so the message is what a script sees when it
/// catches one with `pcall`.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("attempt to access '{member}' on an invalid object")]
    InvalidHandle { member: String },
    #[error("property '{name}' not found or cannot be set")]
    UnknownProperty { name: String },
    #[error("property '{name}' is read-only")]
    ReadOnly { name: String },
    #[error("type mismatch for '{name}': expected {expected}, got {found}")]
    TypeMismatch { name: String, expected: PropertyKind, found: &'static str },
    #[error("function '{name}' not found")]
    UnknownMethod { name: String },
    #[error("call to '{name}' failed: {message}")]
    MethodFailed { name: String, message: String },
    #[error("cannot marshal a {kind} value")]
    Unsupported { kind: &'static str },
}

impl BridgeError {
    pub fn into_lua(self) -> mlua::Error {
        mlua::Error::external(self)
    }
}

/// Failures surfaced to the owners of interpreter instances and script hosts.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to create interpreter instance: {0}")]
    Creation(String),
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Runtime(String),
    #[error("no script content available")]
    NoSource,
    #[error("interpreter state not initialized")]
    NotInitialized,
    #[error("function '{0}' not found in script")]
    MissingFunction(String),
    #[error("failed to reset interpreter instance: {0}")]
    Reset(String),
    #[error("failed to read script '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScriptError {
    pub fn is_load(&self) -> bool {
        matches!(self, ScriptError::Load(_))
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, ScriptError::Runtime(_))
    }
}
