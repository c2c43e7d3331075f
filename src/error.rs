#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve host: {0}")]
    Resolve(String),

    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}
