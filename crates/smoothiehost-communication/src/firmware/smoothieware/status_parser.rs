//! Smoothieware status report parser
//!
//! Smoothieware answers the `?` realtime query in one of two formats
//! depending on the `new_status_format` setting:
//!
//! ```text
//! <Idle,MPos:68.9980,-49.9240,40.4950,WPos:68.9980,-49.9240,40.4950>
//! <Idle|MPos:68.9980,-49.9240,40.4950|WPos:68.9980,-49.9240,40.4950|F:0.0,100.0>
//! ```
//!
//! Both become a [`StatusReport`]. A report with too few fields, a missing
//! position or a non-numeric value is rejected with a [`ProtocolError`].

use smoothiehost_core::{Axes, MachineState, ProtocolError, StatusReport};
use std::collections::BTreeMap;

const KIND: &str = "status";

/// Minimum comma separated tokens: state plus two position triples
const MIN_COMMA_FIELDS: usize = 7;

/// Minimum pipe separated sections: state, MPos and WPos
const MIN_PIPE_FIELDS: usize = 3;

/// Parser for `<...>` status reports
pub struct StatusParser;

impl StatusParser {
    /// Parse a complete status line, including the angle brackets
    pub fn parse(line: &str) -> Result<StatusReport, ProtocolError> {
        let body = line.trim();
        let body = body.strip_prefix('<').unwrap_or(body);
        let body = body.strip_suffix('>').unwrap_or(body);

        if body.contains('|') {
            Self::parse_pipe(body)
        } else {
            Self::parse_comma(body)
        }
    }

    /// Legacy comma format
    ///
    /// Values without a `key:` prefix belong to the most recent key, so
    /// `MPos:1,2,3` spreads over three tokens.
    fn parse_comma(body: &str) -> Result<StatusReport, ProtocolError> {
        let tokens: Vec<&str> = body.split(',').map(str::trim).collect();
        if tokens.len() < MIN_COMMA_FIELDS {
            return Err(ProtocolError::FieldCount {
                kind: KIND,
                expected: MIN_COMMA_FIELDS,
                actual: tokens.len(),
            });
        }

        let mut fields: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut current = String::from("MPos");
        for token in &tokens[1..] {
            let value = match token.split_once(':') {
                Some((key, value)) => {
                    current = key.trim().to_string();
                    value
                }
                None => token,
            };
            fields
                .entry(current.clone())
                .or_default()
                .push(parse_number(value)?);
        }

        Self::build(tokens[0], fields)
    }

    /// `new_status_format` pipe format
    fn parse_pipe(body: &str) -> Result<StatusReport, ProtocolError> {
        let sections: Vec<&str> = body.split('|').map(str::trim).collect();
        if sections.len() < MIN_PIPE_FIELDS {
            return Err(ProtocolError::FieldCount {
                kind: KIND,
                expected: MIN_PIPE_FIELDS,
                actual: sections.len(),
            });
        }

        let mut fields = BTreeMap::new();
        for section in &sections[1..] {
            let Some((key, values)) = section.split_once(':') else {
                tracing::debug!("Ignoring status section without key: {}", section);
                continue;
            };
            let values = values
                .split(',')
                .map(parse_number)
                .collect::<Result<Vec<_>, _>>()?;
            fields.insert(key.trim().to_string(), values);
        }

        Self::build(sections[0], fields)
    }

    fn build(
        state: &str,
        fields: BTreeMap<String, Vec<f64>>,
    ) -> Result<StatusReport, ProtocolError> {
        let mpos = position(&fields, "MPos")?;
        let wpos = position(&fields, "WPos")?;
        Ok(StatusReport {
            state: MachineState::parse(state),
            mpos,
            wpos,
            fields,
        })
    }
}

fn position(fields: &BTreeMap<String, Vec<f64>>, key: &'static str) -> Result<Axes, ProtocolError> {
    let values = fields.get(key).ok_or(ProtocolError::MissingField {
        kind: KIND,
        field: key,
    })?;
    Axes::from_slice(values).ok_or(ProtocolError::FieldCount {
        kind: KIND,
        expected: 3,
        actual: values.len(),
    })
}

fn parse_number(token: &str) -> Result<f64, ProtocolError> {
    let token = token.trim();
    token.parse::<f64>().map_err(|_| ProtocolError::InvalidNumber {
        kind: KIND,
        value: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_comma_format() {
        let report = StatusParser::parse(
            "<Idle,MPos:68.9980,-49.9240,40.4950,WPos:68.9980,-49.9240,40.4950>",
        )
        .unwrap();
        assert_eq!(report.state, MachineState::Idle);
        assert!(report.mpos.approx_eq(&Axes::new(68.998, -49.924, 40.495), 1e-9));
        assert!(report.wpos.approx_eq(&Axes::new(68.998, -49.924, 40.495), 1e-9));
    }

    #[test]
    fn test_parse_comma_format_with_extra_fields() {
        let report = StatusParser::parse(
            "<Run,MPos:1.0,2.0,3.0,WPos:0.5,1.5,2.5,F:1000.0,100.0>",
        )
        .unwrap();
        assert_eq!(report.state, MachineState::Run);
        assert_eq!(report.feed_rate(), Some(1000.0));
        assert_eq!(report.feed_override(), Some(100.0));
    }

    #[test]
    fn test_parse_pipe_format() {
        let report = StatusParser::parse(
            "<Hold|MPos:1.0000,2.0000,3.0000|WPos:4.0000,5.0000,6.0000|F:500.0,100.0|S:12000.0,90.0>",
        )
        .unwrap();
        assert_eq!(report.state, MachineState::Hold);
        assert!(report.wpos.approx_eq(&Axes::new(4.0, 5.0, 6.0), 1e-9));
        assert_eq!(report.spindle_speed(), Some(12000.0));
        assert_eq!(report.speed_override(), Some(90.0));
    }

    #[test]
    fn test_reject_short_report() {
        let err = StatusParser::parse("<Idle,MPos:1,2>").unwrap_err();
        assert!(matches!(err, ProtocolError::FieldCount { actual: 3, .. }));
        assert!(StatusParser::parse("<Idle|MPos:1,2,3>").is_err());
    }

    #[test]
    fn test_reject_bad_number() {
        let err = StatusParser::parse("<Idle,MPos:1,2,abc,WPos:4,5,6>").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidNumber {
                kind: "status",
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_reject_missing_wpos() {
        let err = StatusParser::parse("<Idle|MPos:1,2,3|F:0,100>").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField { field: "WPos", .. }));
    }

    proptest! {
        #[test]
        fn prop_formatted_positions_parse_back(
            m in prop::array::uniform3(-10000.0f64..10000.0),
            w in prop::array::uniform3(-10000.0f64..10000.0),
        ) {
            let line = format!(
                "<Run,MPos:{:.4},{:.4},{:.4},WPos:{:.4},{:.4},{:.4}>",
                m[0], m[1], m[2], w[0], w[1], w[2]
            );
            let report = StatusParser::parse(&line).unwrap();
            prop_assert!(report.mpos.approx_eq(&Axes::new(m[0], m[1], m[2]), 1e-4));
            prop_assert!(report.wpos.approx_eq(&Axes::new(w[0], w[1], w[2]), 1e-4));
        }
    }
}
