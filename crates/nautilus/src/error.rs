use crate::sequencer::BatchId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no scene graph is attached to this session")]
    NoScene,

    #[error("mutation batch {batch} failed ({reason}); a full graph reload is required")]
    ReloadRequired { batch: BatchId, reason: String },

    #[error("invalid configuration JSON: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
