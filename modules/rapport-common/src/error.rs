use thiserror::Error;

#[derive(Error, Debug)]
pub enum RapportError {
    #[error("Configuration error: {0}")]
    Config(String),
}
