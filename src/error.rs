pub type SimpipeResult<T> = Result<T, SimpipeError>;

#[derive(thiserror::Error, Debug)]
pub enum SimpipeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("emit error: {0}")]
    Emit(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimpipeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn emit(msg: impl Into<String>) -> Self {
        Self::Emit(msg.into())
    }
}
