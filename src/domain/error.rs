//! Domain error types.

/// Top-level error type for factortrader.
///
/// Only hard failures live here. Skipped rebalances and optimiser fallbacks
/// are ordinary values (see [`crate::domain::backtest::RebalanceSkip`] and
/// [`crate::domain::optimizer::Fallback`]).
#[derive(Debug, thiserror::Error)]
pub enum FactorTraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FactorTraderError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        FactorTraderError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn data(reason: impl Into<String>) -> Self {
        FactorTraderError::Data {
            reason: reason.into(),
        }
    }
}

impl From<&FactorTraderError> for std::process::ExitCode {
    fn from(err: &FactorTraderError) -> Self {
        let code: u8 = match err {
            FactorTraderError::Io(_) | FactorTraderError::Json(_) => 1,
            FactorTraderError::ConfigParse { .. }
            | FactorTraderError::ConfigMissing { .. }
            | FactorTraderError::ConfigInvalid { .. } => 2,
            FactorTraderError::Data { .. } => 3,
            FactorTraderError::InvalidInput { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
