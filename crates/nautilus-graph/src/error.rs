#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("node already exists: {id}")]
    DuplicateNode { id: String },
    #[error("edge already exists: {id}")]
    DuplicateEdge { id: String },
    #[error("node {id} references unknown parent {parent}")]
    UnknownParent { id: String, parent: String },
    #[error("edge {id} has a missing endpoint")]
    MissingEndpoint { id: String },
}

pub type Result<T> = std::result::Result<T, Error>;
