//! Ошибки движка слияния

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FusionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    /// Не найдено ни одного общего признака
    #[error("no overlapping features between dataset A and dataset B")]
    NoOverlap,

    #[error("invalid target column '{column}': {reason}")]
    InvalidTarget { column: String, reason: String },

    #[error("overlap column '{column}' has incompatible types: {left} in A, {right} in B")]
    TypeMismatch {
        column: String,
        left: String,
        right: String,
    },

    #[error("cannot encode column '{column}': {reason}")]
    Encoding { column: String, reason: String },

    /// Не фатальна: цель пропускается, остальное слияние продолжается
    #[error("target '{target}' has no usable rows")]
    InsufficientData { target: String },

    /// Нарушение внутреннего инварианта, а не ошибка входных данных
    #[error("feature schema mismatch for target '{target}': model expects {expected} features, got {actual}")]
    SchemaMismatch {
        target: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("model error: {0}")]
    Model(String),
}

impl FusionError {
    /// Ошибка вызвана входными данными или конфигурацией вызывающей стороны
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            FusionError::SchemaMismatch { .. } | FusionError::Model(_)
        )
    }
}
