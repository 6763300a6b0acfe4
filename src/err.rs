#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad arguments: {0}")]
    Args(String),

    #[error("handshake failed: {0}")]
    Handshake(String),
}
