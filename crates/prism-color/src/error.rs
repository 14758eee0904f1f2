#[derive(Debug, thiserror::Error)]
pub enum ColorError {
    #[error("unknown pixel format: {0}")]
    UnknownFormat(String),
    #[error("malformed pixel format name: {0}")]
    InvalidFormatName(String),
    #[error("format {0} is already registered with a different layout")]
    FormatConflict(String),
    #[error("unknown color space: {0}")]
    UnknownSpace(String),
    #[error("degenerate primaries for color space {0}")]
    DegenerateSpace(String),
    #[error("unknown transfer curve: {0}")]
    UnknownTrc(String),
    #[error("no conversion from {from} to {to}")]
    NoConversion { from: String, to: String },
    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferSize { needed: usize, actual: usize },
    #[error("invalid color string: {0}")]
    InvalidColour(String),
}

impl ColorError {
    /// Whether the error names something that does not exist (as opposed to a failed path).
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::UnknownFormat(_)
                | Self::InvalidFormatName(_)
                | Self::UnknownSpace(_)
                | Self::UnknownTrc(_)
                | Self::InvalidColour(_)
                | Self::FormatConflict(_)
                | Self::DegenerateSpace(_)
        )
    }
}
