// ============================================================================
// ERRORS — failure taxonomy for the filter-chain engine
// ============================================================================

use thiserror::Error;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Clone, Error)]
pub enum FilterError {
    /// No compatible GPU adapter/device.  Fatal: raised by the engine constructor.
    #[error("no compatible GPU context available")]
    ContextUnavailable,

    #[error("shader '{label}' failed to compile: {diagnostic}")]
    ShaderCompileFailed { label: String, diagnostic: String },

    #[error("program '{label}' failed to link: {diagnostic}")]
    ProgramLinkFailed { label: String, diagnostic: String },

    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("unknown filter kind '{0}'")]
    UnknownFilterKind(String),

    #[error("output readback failed: {0}")]
    Readback(String),

    #[error("malformed filter chain: {0}")]
    ChainFile(String),
}

impl FilterError {
    /// GPU program failures degrade the pass to a pass-through instead of
    /// aborting the whole chain.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FilterError::ShaderCompileFailed { .. }
                | FilterError::ProgramLinkFailed { .. }
                | FilterError::UnknownFilterKind(_)
        )
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::ChainFile(e.to_string())
    }
}
