//! Profile to device command encoding.
//!
//! Wire format: `#TAG,HEX,TAG,HEX,...,TAG,HEX$`. Slot order and widths are
//! fixed by the device firmware.

use std::fmt::Write as _;

use super::profile::{Profile, ProfileError, ProfileField, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Word,
}

impl Width {
    fn max(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
        }
    }

    fn digits(self) -> usize {
        match self {
            Width::Byte => 2,
            Width::Word => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SlotValue {
    /// Reported by the device only; the command carries a fixed placeholder.
    Placeholder(&'static str),
    Field(ProfileField),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    tag: &'static str,
    value: SlotValue,
    width: Width,
}

const fn field(tag: &'static str, field: ProfileField, width: Width) -> Slot {
    Slot {
        tag,
        value: SlotValue::Field(field),
        width,
    }
}

const fn placeholder(tag: &'static str, text: &'static str) -> Slot {
    Slot {
        tag,
        value: SlotValue::Placeholder(text),
        width: Width::Byte,
    }
}

const COMMAND_LAYOUT: [Slot; 16] = [
    field("B", ProfileField::LowBatteryThold, Width::Byte),
    placeholder("RBV", "FF"),
    placeholder("CBV", "FF"),
    field("S", ProfileField::SetupDuration, Width::Byte),
    field("H", ProfileField::HeartbeatInterval, Width::Byte),
    field("T", ProfileField::TempSensitivity, Width::Byte),
    field("U", ProfileField::ScaleOfPumpOnTime, Width::Byte),
    field("L", ProfileField::LostAlarmInterval, Width::Word),
    field("D", ProfileField::TempDetectionInterval, Width::Word),
    field("T1", ProfileField::TempLvl2Thold, Width::Word),
    field("T2", ProfileField::TempLvl3Thold, Width::Word),
    field("T3", ProfileField::TempLvl4Thold, Width::Word),
    field("S1", ProfileField::Lvl2PumpOnTime, Width::Word),
    field("S2", ProfileField::Lvl2PumpOffTime, Width::Word),
    field("S3", ProfileField::Lvl3PumpOnTime, Width::Word),
    field("S4", ProfileField::Lvl3PumpOffTime, Width::Word),
];

const COMMAND_START: char = '#';
const COMMAND_END: char = '$';

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("{field} value {value} does not fit slot {tag}")]
    OutOfWidth { tag: &'static str, field: ProfileField, value: f64 },
}

/// Encode a profile into the command string the device accepts.
///
/// Ranges are not checked here; callers run [`Profile::validate`] first.
/// Missing or non-numeric values, and values that cannot be represented in
/// their slot, are rejected instead of producing a corrupted command.
pub fn encode(profile: &Profile) -> Result<String, EncodeError> {
    let mut command = String::with_capacity(96);
    command.push(COMMAND_START);

    for (i, slot) in COMMAND_LAYOUT.iter().enumerate() {
        if i > 0 {
            command.push(',');
        }
        command.push_str(slot.tag);
        command.push(',');
        match slot.value {
            SlotValue::Placeholder(text) => command.push_str(text),
            SlotValue::Field(field) => {
                let raw = wire_value(profile, field, slot)?;
                let _ = write!(command, "{:0width$X}", raw, width = slot.width.digits());
            }
        }
    }

    command.push(COMMAND_END);
    Ok(command)
}

fn wire_value(profile: &Profile, field: ProfileField, slot: &Slot) -> Result<u32, EncodeError> {
    let value = profile.value(field)?;
    let scaled = match field.kind() {
        ValueKind::Decimal => (value * 10.0).round(),
        ValueKind::Integer => value,
    };
    if scaled < 0.0 || scaled > f64::from(slot.width.max()) {
        return Err(EncodeError::OutOfWidth { tag: slot.tag, field, value });
    }
    Ok(scaled as u32)
}
