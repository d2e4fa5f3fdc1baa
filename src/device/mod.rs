pub mod connection;
pub mod snapshot;

pub use connection::{Connection, ConnectionBuilder, Listener};
pub use snapshot::DeviceSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),

    #[error("Failed to start decode loop: {0}")]
    SpawnError(#[source] std::io::Error),
}

impl DeviceError {
    /// Port absent or busy; the caller may retry later.
    pub fn is_port_unavailable(&self) -> bool {
        matches!(self, DeviceError::SerialError(crate::serial::SerialError::PortUnavailable(..)))
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
