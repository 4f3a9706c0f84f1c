use thiserror::Error;

/// Failures while assembling the runtime: config validation and logging setup
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A required host bridge was not supplied and no desktop default exists
    #[error("Missing host capability {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
