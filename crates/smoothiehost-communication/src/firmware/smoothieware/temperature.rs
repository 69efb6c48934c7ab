//! Temperature reply parser
//!
//! Replies to `M105` look like `ok T:19.8 /0.0 @0 B:20.1 /0.0 @0`. Every
//! `designator:current /setpoint` group is extracted; the setpoint is
//! optional and either half may be blank.

use regex::Regex;
use smoothiehost_core::{TemperatureReport, ThermalReading, ThermalZone};

fn temperature_regex() -> &'static Regex {
    static TEMPERATURE_REGEX: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    TEMPERATURE_REGEX.get_or_init(|| {
        Regex::new(r"([TB]\d*):([-+]?\d*\.?\d*)(?:\s?/)?([-+]?\d*\.?\d*)")
            .expect("invalid regex pattern")
    })
}

/// Check whether a line carries a temperature reply
pub fn is_temperature_line(line: &str) -> bool {
    line.starts_with("ok T:") || line.starts_with("T:") || line.contains(" T:")
}

/// Extract every zone reading from a temperature reply
///
/// Zones whose designator is not recognised are skipped. Values that do
/// not parse are reported as `None` rather than zero.
pub fn parse_temperatures(line: &str) -> TemperatureReport {
    let mut report = TemperatureReport::default();
    for caps in temperature_regex().captures_iter(line) {
        let Some(zone) = ThermalZone::from_designator(&caps[1]) else {
            continue;
        };
        let reading = ThermalReading {
            current: parse_value(caps.get(2).map(|m| m.as_str())),
            setpoint: parse_value(caps.get(3).map(|m| m.as_str())),
        };
        report.zones.insert(zone, reading);
    }
    report
}

fn parse_value(value: Option<&str>) -> Option<f64> {
    value.filter(|v| !v.is_empty()).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotend_and_bed() {
        let report = parse_temperatures("ok T:19.8 /0.0 @0 B:20.1 /0.0 @0");
        assert_eq!(
            report.hotend(0),
            Some(&ThermalReading {
                current: Some(19.8),
                setpoint: Some(0.0)
            })
        );
        assert_eq!(
            report.bed(),
            Some(&ThermalReading {
                current: Some(20.1),
                setpoint: Some(0.0)
            })
        );
    }

    #[test]
    fn test_missing_setpoint_is_none() {
        let report = parse_temperatures("T:200");
        let reading = report.hotend(0).unwrap();
        assert_eq!(reading.current, Some(200.0));
        assert_eq!(reading.setpoint, None);
    }

    #[test]
    fn test_numbered_hotends() {
        let report = parse_temperatures("ok T0:180.0 /185.0 T1:25.5 /0.0");
        assert_eq!(report.hotend(0).unwrap().setpoint, Some(185.0));
        assert_eq!(report.hotend(1).unwrap().current, Some(25.5));
        assert!(report.bed().is_none());
    }

    #[test]
    fn test_detection() {
        assert!(is_temperature_line("ok T:19.8 /0.0"));
        assert!(is_temperature_line("T:19.8 /0.0"));
        assert!(is_temperature_line("ok B:20 T:21"));
        assert!(!is_temperature_line("ok"));
        assert!(!is_temperature_line("Tool changed"));
    }
}
