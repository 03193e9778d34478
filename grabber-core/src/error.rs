use thiserror::Error;

/// All errors produced by grabber-core.
#[derive(Debug, Error)]
pub enum GrabberError {
    #[error("device setup error: {0}")]
    DeviceSetup(String),

    #[error("no device found with id {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("USB transfer error: {0}")]
    Transfer(String),

    #[error("sample queue consumer is gone, nothing is draining to disk")]
    QueueDisconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GrabberError>;
