pub mod encoder;
pub mod profile;
pub mod settings;

pub use encoder::{encode, EncodeError};
pub use profile::{Profile, ProfileError, ProfileField, ValueKind};
pub use settings::{Settings, SettingsError};
