use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::{Profile, ProfileField};
use crate::serial::{Ack, ParseResult, TelemetryRecord};

/// Latest known value of every field the device has reported.
///
/// Records are sparse, so a field only changes when a line carrying it
/// arrives; nothing is ever reset to "absent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub status: Option<String>,
    pub heartbeat_flag: Option<bool>,
    pub low_temp_flag: Option<bool>,
    pub low_bat_flag: Option<bool>,
    pub setup_flag: Option<bool>,
    pub temp: Option<f64>,
    pub cd_battery_volt: Option<f64>,
    pub rts_battery_volt: Option<f64>,
    pub config: HashMap<ProfileField, f64>,
    pub last_ack: Option<Ack>,
    pub lines_applied: u64,
    /// Local time the last telemetry record arrived.
    pub updated_at: Option<DateTime<Local>>,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one parse result in. Returns `false` for unrecognized lines.
    pub fn apply(&mut self, result: &ParseResult) -> bool {
        match result {
            ParseResult::Telemetry(record) => self.apply_record(record),
            ParseResult::Ack(ack) => self.last_ack = Some(*ack),
            ParseResult::Unrecognized => return false,
        }
        self.lines_applied += 1;
        true
    }

    fn apply_record(&mut self, record: &TelemetryRecord) {
        merge(&mut self.status, &record.status);
        merge(&mut self.heartbeat_flag, &record.heartbeat_flag);
        merge(&mut self.low_temp_flag, &record.low_temp_flag);
        merge(&mut self.low_bat_flag, &record.low_bat_flag);
        merge(&mut self.setup_flag, &record.setup_flag);
        merge(&mut self.temp, &record.temp);
        merge(&mut self.cd_battery_volt, &record.cd_battery_volt);
        merge(&mut self.rts_battery_volt, &record.rts_battery_volt);
        for field in ProfileField::ALL {
            if let Some(value) = record.config_value(field) {
                self.config.insert(field, value);
            }
        }
        self.updated_at = Some(Local::now());
    }

    /// Profile made of the configuration values the device has echoed so far.
    pub fn reported_profile(&self) -> Profile {
        let mut profile = Profile {
            name: Some("Device".to_string()),
            ..Default::default()
        };
        for (&field, value) in &self.config {
            profile.set(field, value.to_string());
        }
        profile
    }
}

fn merge<T: Clone>(slot: &mut Option<T>, update: &Option<T>) {
    if let Some(value) = update {
        *slot = Some(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::ProtocolParser;

    #[test]
    fn test_sparse_records_do_not_clear_fields() {
        let mut parser = ProtocolParser::new();
        let mut snapshot = DeviceSnapshot::new();
        let lines = [
            "Status : 83 Hex",
            "Fahrenheit Temperature : 34.2 'F",
            "Current Battery Voltage : 9.6 Volts",
            "OK",
        ];
        for line in lines {
            snapshot.apply(&parser.parse_line(line));
        }
        assert_eq!(snapshot.status.as_deref(), Some("83"));
        assert_eq!(snapshot.temp, Some(34.2));
        assert_eq!(snapshot.cd_battery_volt, Some(9.6));
        assert_eq!(snapshot.rts_battery_volt, None);
        assert_eq!(snapshot.last_ack, Some(Ack::Ok));
        assert_eq!(snapshot.lines_applied, 4);
    }

    #[test]
    fn test_updated_at_tracks_telemetry_only() {
        let mut parser = ProtocolParser::new();
        let mut snapshot = DeviceSnapshot::new();
        assert!(snapshot.updated_at.is_none());

        snapshot.apply(&parser.parse_line("OK"));
        snapshot.apply(&parser.parse_line("garbage"));
        assert!(snapshot.updated_at.is_none());

        let before = Local::now();
        snapshot.apply(&parser.parse_line("Status : 80 Hex"));
        let first = snapshot.updated_at.expect("status line stamps the snapshot");
        assert!(first >= before);

        snapshot.apply(&parser.parse_line("Fahrenheit Temperature : 33.0 'F"));
        assert!(snapshot.updated_at.unwrap() >= first);
    }

    #[test]
    fn test_unrecognized_not_counted() {
        let mut snapshot = DeviceSnapshot::new();
        assert!(!snapshot.apply(&ParseResult::Unrecognized));
        assert_eq!(snapshot.lines_applied, 0);
    }

    #[test]
    fn test_reported_profile_from_echo_lines() {
        let mut parser = ProtocolParser::new();
        let mut snapshot = DeviceSnapshot::new();
        let lines = [
            "Temp. level 2 threshold : 40 'F",
            "Low Battery threshold : 4.5 Volts",
            "Setup signal interval : 5 Mins",
        ];
        for line in lines {
            snapshot.apply(&parser.parse_line(line));
        }
        let profile = snapshot.reported_profile();
        assert_eq!(profile.get(ProfileField::TempLvl2Thold), Some("40"));
        assert_eq!(profile.get(ProfileField::LowBatteryThold), Some("4.5"));
        assert_eq!(profile.get(ProfileField::SetupDuration), Some("5"));
        assert_eq!(profile.get(ProfileField::HeartbeatInterval), None);
    }
}
