use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed source markup: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        PipelineError::Parse(msg.into())
    }
}

impl From<quick_xml::Error> for PipelineError {
    fn from(e: quick_xml::Error) -> Self {
        PipelineError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
