use thiserror::Error;

pub type NotepadResult<T> = Result<T, NotepadError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid storage key \"{0}\"")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("cannot import data from newer version {found} (current version is {current})")]
    UnsupportedVersion { found: u32, current: u32 },

    #[error("failed to decompress archive: {0}")]
    Decompress(std::io::Error),

    #[error("failed to compress archive: {0}")]
    Compress(std::io::Error),

    #[error("failed to parse archive: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response contained no text")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider is not configured")]
    NotConfigured,

    #[error("{0} is not supported by this identity provider")]
    Unsupported(&'static str),

    #[error("identity provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Figment(Box::new(value))
    }
}

/// Errors surfaced by the application shell to its front end.
#[derive(Debug, Error)]
pub enum NotepadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not signed in")]
    SignedOut,

    #[error("no note is open")]
    NoActiveNote,
}
