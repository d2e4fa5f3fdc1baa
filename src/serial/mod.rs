pub mod cancel;
pub mod frame;
pub mod interface;
pub mod protocol;

pub use cancel::CancelToken;
pub use frame::FrameDecoder;
pub use interface::{available_ports, SerialTransport};
pub use protocol::{Ack, ParseResult, ProtocolParser, StatusByte, TelemetryRecord};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port unavailable: {0}: {1}")]
    PortUnavailable(String, #[source] serialport::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
