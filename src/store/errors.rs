use crate::models::ValidationError;

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to encode or decode order payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Transport(#[from] sqlx::Error),

    #[error("failed to {stage} transaction: {source}")]
    Transaction {
        stage: TxStage,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TxStage {
    Begin,
    Commit,
    Rollback,
}

impl std::fmt::Display for TxStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            TxStage::Begin => "begin",
            TxStage::Commit => "commit",
            TxStage::Rollback => "rollback",
        };
        f.write_str(stage)
    }
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Validation(_) => "validation",
            StoreError::Serialization(_) => "serialization",
            StoreError::Transport(_) => "transport",
            StoreError::Transaction { .. } => "transaction",
        }
    }

    pub(crate) fn transaction(stage: TxStage) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| StoreError::Transaction { stage, source }
    }
}
