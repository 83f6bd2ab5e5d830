use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid engine state: {0}")]
    InvalidState(String),

    #[error("cannot tell which validator applies to {0} (expected a Dockerfile or a compose YAML file)")]
    UnknownFileKind(PathBuf),

    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("workspace is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("session file corrupted: {0}")]
    StateCorrupted(String),

    #[error("session was written by an incompatible version (found v{found}, expected v{expected})")]
    SessionVersion { found: u32, expected: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
