//! FreezeDrip device link: line protocol decoding, profile command encoding
//! and a threaded serial connection.

pub mod commands;
pub mod config;
pub mod device;
pub mod serial;

pub use config::{encode, Profile, ProfileField};
pub use device::{Connection, ConnectionBuilder, DeviceSnapshot};
pub use serial::{Ack, ParseResult, ProtocolParser, TelemetryRecord};
