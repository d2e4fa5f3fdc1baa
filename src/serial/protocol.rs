use serde::{Deserialize, Serialize};

use crate::config::profile::ProfileField;

/// Battery readings of exactly this many tenths of a volt mean "unknown".
const UNKNOWN_VOLTAGE_TENTHS: i64 = 0xFF;

const STATUS_PREFIX: &str = "Status : ";
const STATUS_SUFFIX: &str = " Hex";
const TEMPERATURE_PREFIX: &str = "Fahrenheit Temperature : ";
const RECEIVED_BATTERY_PREFIX: &str = "Received Battery Value: ";
const CURRENT_BATTERY_PREFIX: &str = "Current Battery Voltage : ";
const FAHRENHEIT_SUFFIX: &str = " 'F";
const VOLTS_SUFFIX: &str = " Volts";

/// Lines in which the device echoes one of its configuration values.
/// Format: `<prefix><number><suffix>`
const CONFIG_ECHO_LINES: [(&str, &str, ProfileField); 14] = [
    ("Temp. level 2 threshold : ", FAHRENHEIT_SUFFIX, ProfileField::TempLvl2Thold),
    ("Temp. level 3 threshold : ", FAHRENHEIT_SUFFIX, ProfileField::TempLvl3Thold),
    ("Temp. level 4 threshold : ", FAHRENHEIT_SUFFIX, ProfileField::TempLvl4Thold),
    ("Temperature sensitivity : ", FAHRENHEIT_SUFFIX, ProfileField::TempSensitivity),
    ("Temp. detection interval : ", " Secs", ProfileField::TempDetectionInterval),
    ("Scale of S1 and S3 : ", " X", ProfileField::ScaleOfPumpOnTime),
    ("Pump on time of level 2 : ", " Secs", ProfileField::Lvl2PumpOnTime),
    ("Pump off time of level 2 : ", " Secs", ProfileField::Lvl2PumpOffTime),
    ("Pump on time of level 3 : ", " Secs", ProfileField::Lvl3PumpOnTime),
    ("Pump off time of level 3 : ", " Secs", ProfileField::Lvl3PumpOffTime),
    ("Low Battery threshold : ", VOLTS_SUFFIX, ProfileField::LowBatteryThold),
    ("Interval of the Lost alarm : ", " Secs", ProfileField::LostAlarmInterval),
    ("H.B./L. Bat. interval : ", " Mins", ProfileField::HeartbeatInterval),
    ("Setup signal interval : ", " Mins", ProfileField::SetupDuration),
];

/// Device acknowledgement of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    Ok,
    Error,
}

/// Status byte reported by the device.
///
/// Bit layout: 0 heartbeat, 1 low temperature, 2 low battery, 4 setup,
/// 7 CD role (controller/drip unit; cleared on an RTS sensor unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusByte(pub u8);

impl StatusByte {
    const HEARTBEAT: u8 = 0b0000_0001;
    const LOW_TEMP: u8 = 0b0000_0010;
    const LOW_BAT: u8 = 0b0000_0100;
    const SETUP: u8 = 0b0001_0000;
    const CD: u8 = 0b1000_0000;

    /// Parse the hexadecimal text of a `Status` line.
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        u8::from_str_radix(digits, 16).ok().map(StatusByte)
    }

    pub fn heartbeat(self) -> bool {
        self.0 & Self::HEARTBEAT != 0
    }

    pub fn low_temp(self) -> bool {
        self.0 & Self::LOW_TEMP != 0
    }

    pub fn low_bat(self) -> bool {
        self.0 & Self::LOW_BAT != 0
    }

    pub fn setup(self) -> bool {
        self.0 & Self::SETUP != 0
    }

    pub fn is_cd(self) -> bool {
        self.0 & Self::CD != 0
    }

    pub fn is_rts(self) -> bool {
        !self.is_cd()
    }
}

/// Sparse snapshot of one inbound line. Only the fields carried by that line
/// are populated; everything else stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_temp_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_bat_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd_battery_volt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rts_battery_volt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_lvl_2_thold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_lvl_3_thold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_lvl_4_thold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_sensitivity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_detection_interval: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_of_pump_on_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvl_2_pump_on_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvl_2_pump_off_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvl_3_pump_on_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvl_3_pump_off_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_battery_thold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lost_alarm_interval: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_duration: Option<f64>,
}

impl TelemetryRecord {
    fn from_status(text: &str, status: StatusByte) -> Self {
        Self {
            status: Some(text.to_string()),
            heartbeat_flag: Some(status.heartbeat()),
            low_temp_flag: Some(status.low_temp()),
            low_bat_flag: Some(status.low_bat()),
            setup_flag: Some(status.setup()),
            ..Self::default()
        }
    }

    fn from_config_echo(field: ProfileField, value: f64) -> Self {
        let mut record = Self::default();
        *record.config_slot(field) = Some(value);
        record
    }

    /// Echoed configuration value for `field`, if this record carries one.
    pub fn config_value(&self, field: ProfileField) -> Option<f64> {
        match field {
            ProfileField::TempLvl2Thold => self.temp_lvl_2_thold,
            ProfileField::TempLvl3Thold => self.temp_lvl_3_thold,
            ProfileField::TempLvl4Thold => self.temp_lvl_4_thold,
            ProfileField::TempSensitivity => self.temp_sensitivity,
            ProfileField::TempDetectionInterval => self.temp_detection_interval,
            ProfileField::ScaleOfPumpOnTime => self.scale_of_pump_on_time,
            ProfileField::Lvl2PumpOnTime => self.lvl_2_pump_on_time,
            ProfileField::Lvl2PumpOffTime => self.lvl_2_pump_off_time,
            ProfileField::Lvl3PumpOnTime => self.lvl_3_pump_on_time,
            ProfileField::Lvl3PumpOffTime => self.lvl_3_pump_off_time,
            ProfileField::LowBatteryThold => self.low_battery_thold,
            ProfileField::LostAlarmInterval => self.lost_alarm_interval,
            ProfileField::HeartbeatInterval => self.heartbeat_interval,
            ProfileField::SetupDuration => self.setup_duration,
        }
    }

    fn config_slot(&mut self, field: ProfileField) -> &mut Option<f64> {
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

/// Outcome of parsing one decoded line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseResult {
    Telemetry(TelemetryRecord),
    Ack(Ack),
    /// Unknown line, malformed payload, or a reading dropped by the status rules.
    Unrecognized,
}

/// Stateful decoder for the device's text protocol.
///
/// The only state is the last status byte seen. It decides whether battery
/// voltage lines belong to the CD unit or the RTS unit, and voltage lines are
/// dropped until the first `Status` line arrives. One parser per connection.
#[derive(Debug, Clone, Default)]
pub struct ProtocolParser {
    last_status: Option<StatusByte>,
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_status(&self) -> Option<StatusByte> {
        self.last_status
    }

    /// `None` until a status line has been observed.
    pub fn is_cd(&self) -> Option<bool> {
        self.last_status.map(StatusByte::is_cd)
    }

    pub fn is_rts(&self) -> Option<bool> {
        self.last_status.map(StatusByte::is_rts)
    }

    pub fn parse_line(&mut self, line: &str) -> ParseResult {
        match line {
            "OK" => return ParseResult::Ack(Ack::Ok),
            "ERROR" => return ParseResult::Ack(Ack::Error),
            _ => {}
        }

        if let Some(text) = strip_field(line, STATUS_PREFIX, STATUS_SUFFIX) {
            return match StatusByte::from_hex(text) {
                Some(status) => {
                    self.last_status = Some(status);
                    ParseResult::Telemetry(TelemetryRecord::from_status(text, status))
                }
                None => {
                    log::debug!("Ignoring status line with non-hex payload: {:?}", line);
                    ParseResult::Unrecognized
                }
            };
        }

        if let Some(text) = strip_field(line, TEMPERATURE_PREFIX, FAHRENHEIT_SUFFIX) {
            return telemetry(text, |temp| TelemetryRecord {
                temp: Some(temp),
                ..Default::default()
            });
        }

        if let Some(text) = strip_field(line, RECEIVED_BATTERY_PREFIX, VOLTS_SUFFIX) {
            // Relayed RTS readings only mean something on the CD unit.
            if self.is_cd() != Some(true) {
                log::debug!("Dropping relayed battery value without CD status: {:?}", line);
                return ParseResult::Unrecognized;
            }
            return telemetry(text, |volt| TelemetryRecord {
                rts_battery_volt: Some(volt),
                ..Default::default()
            });
        }

        if let Some(text) = strip_field(line, CURRENT_BATTERY_PREFIX, VOLTS_SUFFIX) {
            return self.parse_current_battery(text);
        }

        for (prefix, suffix, field) in CONFIG_ECHO_LINES {
            if let Some(text) = strip_field(line, prefix, suffix) {
                return telemetry(text, |value| TelemetryRecord::from_config_echo(field, value));
            }
        }

        ParseResult::Unrecognized
    }

    fn parse_current_battery(&self, text: &str) -> ParseResult {
        let Some(status) = self.last_status else {
            log::debug!("Dropping battery voltage received before any status line");
            return ParseResult::Unrecognized;
        };
        let Some(volt) = parse_number(text) else {
            return ParseResult::Unrecognized;
        };
        if is_unknown_voltage(volt) {
            return ParseResult::Unrecognized;
        }

        let record = if status.is_cd() {
            TelemetryRecord {
                cd_battery_volt: Some(volt),
                ..Default::default()
            }
        } else {
            TelemetryRecord {
                rts_battery_volt: Some(volt),
                ..Default::default()
            }
        };
        ParseResult::Telemetry(record)
    }
}

fn strip_field<'a>(line: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    Some(rest.strip_suffix(suffix).unwrap_or(rest))
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn telemetry(text: &str, build: impl FnOnce(f64) -> TelemetryRecord) -> ParseResult {
    match parse_number(text) {
        Some(value) => ParseResult::Telemetry(build(value)),
        None => {
            log::debug!("Ignoring non-numeric payload: {:?}", text);
            ParseResult::Unrecognized
        }
    }
}

fn is_unknown_voltage(volt: f64) -> bool {
    (volt * 10.0).round() as i64 == UNKNOWN_VOLTAGE_TENTHS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_flags() {
        let mut parser = ProtocolParser::new();
        let ParseResult::Telemetry(record) = parser.parse_line("Status : 83 Hex") else {
            panic!("status line should produce telemetry");
        };
        assert_eq!(record.status.as_deref(), Some("83"));
        assert_eq!(record.heartbeat_flag, Some(true));
        assert_eq!(record.low_temp_flag, Some(true));
        assert_eq!(record.low_bat_flag, Some(false));
        assert_eq!(record.setup_flag, Some(false));
        assert_eq!(record.temp, None);
        assert_eq!(parser.is_cd(), Some(true));
        assert_eq!(parser.is_rts(), Some(false));
    }

    #[test]
    fn test_status_setup_and_low_bat_bits() {
        let status = StatusByte::from_hex("14").unwrap();
        assert!(status.low_bat());
        assert!(status.setup());
        assert!(!status.heartbeat());
        assert!(status.is_rts());
    }

    #[test]
    fn test_non_hex_status_keeps_previous_state() {
        let mut parser = ProtocolParser::new();
        parser.parse_line("Status : 80 Hex");
        assert_eq!(parser.parse_line("Status : zz Hex"), ParseResult::Unrecognized);
        assert_eq!(parser.last_status(), Some(StatusByte(0x80)));
    }

    #[test]
    fn test_voltage_dropped_without_status() {
        let mut parser = ProtocolParser::new();
        let result = parser.parse_line("Current Battery Voltage : 9.6 Volts");
        assert_eq!(result, ParseResult::Unrecognized);
        assert_eq!(parser.is_cd(), None);
    }

    #[test]
    fn test_sentinel_rounding_boundary() {
        assert!(is_unknown_voltage(25.5));
        assert!(is_unknown_voltage(25.46));
        assert!(is_unknown_voltage(25.54));
        assert!(!is_unknown_voltage(25.44));
        assert!(!is_unknown_voltage(25.56));
    }

    #[test]
    fn test_unparsable_temperature_is_unrecognized() {
        let mut parser = ProtocolParser::new();
        let result = parser.parse_line("Fahrenheit Temperature : --.- 'F");
        assert_eq!(result, ParseResult::Unrecognized);
    }

    #[test]
    fn test_config_echo_sets_single_field() {
        let mut parser = ProtocolParser::new();
        let result = parser.parse_line("Pump off time of level 3 : 30 Secs");
        let ParseResult::Telemetry(record) = result else {
            panic!("pump timing should parse");
        };
        assert_eq!(record.lvl_3_pump_off_time, Some(30.0));
        assert_eq!(record.config_value(ProfileField::Lvl3PumpOffTime), Some(30.0));
        assert_eq!(
            TelemetryRecord { lvl_3_pump_off_time: None, ..record },
            TelemetryRecord::default()
        );
    }
}
