use serde::{Deserialize, Serialize};

/// How a profile value is written by the user and checked before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// One decimal place is significant; sent as tenths.
    Decimal,
    /// Whole number, sent as-is.
    Integer,
}

/// Every device-configurable setting carried by a [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    TempLvl2Thold,
    TempLvl3Thold,
    TempLvl4Thold,
    TempSensitivity,
    TempDetectionInterval,
    ScaleOfPumpOnTime,
    Lvl2PumpOnTime,
    Lvl2PumpOffTime,
    Lvl3PumpOnTime,
    Lvl3PumpOffTime,
    LowBatteryThold,
    LostAlarmInterval,
    HeartbeatInterval,
    SetupDuration,
}

impl ProfileField {
    pub const ALL: [ProfileField; 14] = [
        ProfileField::TempLvl2Thold,
        ProfileField::TempLvl3Thold,
        ProfileField::TempLvl4Thold,
        ProfileField::TempSensitivity,
        ProfileField::TempDetectionInterval,
        ProfileField::ScaleOfPumpOnTime,
        ProfileField::Lvl2PumpOnTime,
        ProfileField::Lvl2PumpOffTime,
        ProfileField::Lvl3PumpOnTime,
        ProfileField::Lvl3PumpOffTime,
        ProfileField::LowBatteryThold,
        ProfileField::LostAlarmInterval,
        ProfileField::HeartbeatInterval,
        ProfileField::SetupDuration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProfileField::TempLvl2Thold => "temp_lvl_2_thold",
            ProfileField::TempLvl3Thold => "temp_lvl_3_thold",
            ProfileField::TempLvl4Thold => "temp_lvl_4_thold",
            ProfileField::TempSensitivity => "temp_sensitivity",
            ProfileField::TempDetectionInterval => "temp_detection_interval",
            ProfileField::ScaleOfPumpOnTime => "scale_of_pump_on_time",
            ProfileField::Lvl2PumpOnTime => "lvl_2_pump_on_time",
            ProfileField::Lvl2PumpOffTime => "lvl_2_pump_off_time",
            ProfileField::Lvl3PumpOnTime => "lvl_3_pump_on_time",
            ProfileField::Lvl3PumpOffTime => "lvl_3_pump_off_time",
            ProfileField::LowBatteryThold => "low_battery_thold",
            ProfileField::LostAlarmInterval => "lost_alarm_interval",
            ProfileField::HeartbeatInterval => "heartbeat_interval",
            ProfileField::SetupDuration => "setup_duration",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ProfileField::TempLvl2Thold
            | ProfileField::TempLvl3Thold
            | ProfileField::TempLvl4Thold
            | ProfileField::TempSensitivity => "'F",
            ProfileField::TempDetectionInterval
            | ProfileField::Lvl2PumpOnTime
            | ProfileField::Lvl2PumpOffTime
            | ProfileField::Lvl3PumpOnTime
            | ProfileField::Lvl3PumpOffTime
            | ProfileField::LostAlarmInterval => "sec",
            ProfileField::ScaleOfPumpOnTime => "X",
            ProfileField::LowBatteryThold => "V",
            ProfileField::HeartbeatInterval | ProfileField::SetupDuration => "min",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            ProfileField::TempLvl2Thold
            | ProfileField::TempLvl3Thold
            | ProfileField::TempLvl4Thold
            | ProfileField::TempSensitivity
            | ProfileField::ScaleOfPumpOnTime
            | ProfileField::LowBatteryThold => ValueKind::Decimal,
            _ => ValueKind::Integer,
        }
    }

    /// Inclusive range accepted by the device.
    pub fn range(self) -> (f64, f64) {
        match self {
            ProfileField::TempLvl2Thold
            | ProfileField::TempLvl3Thold
            | ProfileField::TempLvl4Thold => (14.0, 99.0),
            ProfileField::TempSensitivity => (0.1, 3.0),
            ProfileField::TempDetectionInterval => (1.0, 600.0),
            ProfileField::ScaleOfPumpOnTime => (1.0, 10.0),
            ProfileField::Lvl2PumpOnTime
            | ProfileField::Lvl2PumpOffTime
            | ProfileField::Lvl3PumpOnTime
            | ProfileField::Lvl3PumpOffTime => (30.0, 600.0),
            ProfileField::LowBatteryThold => (3.0, 6.0),
            ProfileField::LostAlarmInterval => (1.0, 300.0),
            ProfileField::HeartbeatInterval => (1.0, 180.0),
            ProfileField::SetupDuration => (1.0, 10.0),
        }
    }

    /// Parse `text` the way this field is written, without any range check.
    pub fn parse_value(self, text: &str) -> Result<f64, ProfileError> {
        let trimmed = text.trim();
        let not_integer = || ProfileError::NotInteger {
            field: self,
            value: text.to_string(),
        };
        match self.kind() {
            ValueKind::Decimal => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ProfileError::NotNumeric {
                    field: self,
                    value: text.to_string(),
                }),
            ValueKind::Integer => {
                if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(not_integer());
                }
                trimmed
                    .parse::<u64>()
                    .map(|v| v as f64)
                    .map_err(|_| not_integer())
            }
        }
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("{0} is not set")]
    Missing(ProfileField),

    #[error("{field} must be a number, got {value:?}")]
    NotNumeric { field: ProfileField, value: String },

    #[error("{field} must be a whole number, got {value:?}")]
    NotInteger { field: ProfileField, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange { field: ProfileField, value: f64, min: f64, max: f64 },
}

/// Device configuration as edited by the user.
///
/// Values are kept as the text the user typed; `id` and `name` belong to
/// whatever store the profile was loaded from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub temp_lvl_2_thold: Option<String>,
    pub temp_lvl_3_thold: Option<String>,
    pub temp_lvl_4_thold: Option<String>,
    pub temp_sensitivity: Option<String>,
    pub temp_detection_interval: Option<String>,
    pub scale_of_pump_on_time: Option<String>,
    pub lvl_2_pump_on_time: Option<String>,
    pub lvl_2_pump_off_time: Option<String>,
    pub lvl_3_pump_on_time: Option<String>,
    pub lvl_3_pump_off_time: Option<String>,
    pub low_battery_thold: Option<String>,
    pub lost_alarm_interval: Option<String>,
    pub heartbeat_interval: Option<String>,
    pub setup_duration: Option<String>,
}

impl Profile {
    /// The profile seeded into a fresh profile store.
    pub fn factory_default() -> Self {
        let mut profile = Profile {
            name: Some("Default".to_string()),
            ..Default::default()
        };
        let values = [
            (ProfileField::TempLvl2Thold, "40"),
            (ProfileField::TempLvl3Thold, "37"),
            (ProfileField::TempLvl4Thold, "32"),
            (ProfileField::TempSensitivity, "1"),
            (ProfileField::TempDetectionInterval, "60"),
            (ProfileField::ScaleOfPumpOnTime, "2"),
            (ProfileField::Lvl2PumpOnTime, "30"),
            (ProfileField::Lvl2PumpOffTime, "60"),
            (ProfileField::Lvl3PumpOnTime, "60"),
            (ProfileField::Lvl3PumpOffTime, "30"),
            (ProfileField::LowBatteryThold, "9.6"),
            (ProfileField::LostAlarmInterval, "10"),
            (ProfileField::HeartbeatInterval, "60"),
            (ProfileField::SetupDuration, "5"),
        ];
        for (field, value) in values {
            profile.set(field, value);
        }
        profile
    }

    pub fn get(&self, field: ProfileField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) {
        *self.slot_mut(field) = Some(value.into());
    }

    /// Numeric value of `field`, failing on missing or malformed text.
    pub fn value(&self, field: ProfileField) -> Result<f64, ProfileError> {
        let text = self.get(field).ok_or(ProfileError::Missing(field))?;
        field.parse_value(text)
    }

    pub fn check_field(&self, field: ProfileField) -> Result<(), ProfileError> {
        let value = self.value(field)?;
        let (min, max) = field.range();
        if value < min || value > max {
            return Err(ProfileError::OutOfRange { field, value, min, max });
        }
        Ok(())
    }

    /// First failing field in table order.
    pub fn validate(&self) -> Result<(), ProfileError> {
        ProfileField::ALL.iter().try_for_each(|&field| self.check_field(field))
    }

    pub fn invalid_fields(&self) -> Vec<ProfileField> {
        ProfileField::ALL
            .iter()
            .copied()
            .filter(|&field| self.check_field(field).is_err())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn slot(&self, field: ProfileField) -> &Option<String> {
        match field {
            ProfileField::TempLvl2Thold => &self.temp_lvl_2_thold,
            ProfileField::TempLvl3Thold => &self.temp_lvl_3_thold,
            ProfileField::TempLvl4Thold => &self.temp_lvl_4_thold,
            ProfileField::TempSensitivity => &self.temp_sensitivity,
            ProfileField::TempDetectionInterval => &self.temp_detection_interval,
            ProfileField::ScaleOfPumpOnTime => &self.scale_of_pump_on_time,
            ProfileField::Lvl2PumpOnTime => &self.lvl_2_pump_on_time,
            ProfileField::Lvl2PumpOffTime => &self.lvl_2_pump_off_time,
            ProfileField::Lvl3PumpOnTime => &self.lvl_3_pump_on_time,
            ProfileField::Lvl3PumpOffTime => &self.lvl_3_pump_off_time,
            ProfileField::LowBatteryThold => &self.low_battery_thold,
            ProfileField::LostAlarmInterval => &self.lost_alarm_interval,
            ProfileField::HeartbeatInterval => &self.heartbeat_interval,
            ProfileField::SetupDuration => &self.setup_duration,
        }
    }

    fn slot_mut(&mut self, field: ProfileField) -> &mut Option<String> {
        match field {
            ProfileField::TempLvl2Thold => &mut self.temp_lvl_2_thold,
            ProfileField::TempLvl3Thold => &mut self.temp_lvl_3_thold,
            ProfileField::TempLvl4Thold => &mut self.temp_lvl_4_thold,
            ProfileField::TempSensitivity => &mut self.temp_sensitivity,
            ProfileField::TempDetectionInterval => &mut self.temp_detection_interval,
            ProfileField::ScaleOfPumpOnTime => &mut self.scale_of_pump_on_time,
            ProfileField::Lvl2PumpOnTime => &mut self.lvl_2_pump_on_time,
            ProfileField::Lvl2PumpOffTime => &mut self.lvl_2_pump_off_time,
            ProfileField::Lvl3PumpOnTime => &mut self.lvl_3_pump_on_time,
            ProfileField::Lvl3PumpOffTime => &mut self.lvl_3_pump_off_time,
            ProfileField::LowBatteryThold => &mut self.low_battery_thold,
            ProfileField::LostAlarmInterval => &mut self.lost_alarm_interval,
            ProfileField::HeartbeatInterval => &mut self.heartbeat_interval,
            ProfileField::SetupDuration => &mut self.setup_duration,
        }
    }
}
