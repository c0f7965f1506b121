//! Turning raw store values into typed records.
//!
//! Measurement lines are positional CSV. Which layout a deployment writes is
//! configuration ([`MeasurementSchema`]); the decoder never guesses. Fields
//! that are missing or fail to parse become zero values and are reported as
//! [`DecodeAnomaly`]s so the caller can decide whether to keep the record.

use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::config::KeyLayout;
use crate::error::PipelineError;
use crate::models::check::CheckDescriptor;
use crate::models::measurement::{FiveFieldPoint, MeasurementPoint, SixFieldPoint};
use crate::models::monitor::MonitorDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSchema {
    /// `time,raw,actual,predicted,anomaly,likelihood`
    #[default]
    SixField,
    /// `time,actual,predicted,anomaly,likelihood`
    FiveField,
}

impl MeasurementSchema {
    pub fn field_count(self) -> usize {
        match self {
            MeasurementSchema::SixField => 6,
            MeasurementSchema::FiveField => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementSchema::SixField => "six_field",
            MeasurementSchema::FiveField => "five_field",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown measurement schema {0:?}, expected six_field or five_field")]
pub struct UnknownSchema(pub String);

impl FromStr for MeasurementSchema {
    type Err = UnknownSchema;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "six_field" | "6" => Ok(MeasurementSchema::SixField),
            "five_field" | "5" => Ok(MeasurementSchema::FiveField),
            other => Err(UnknownSchema(other.to_string())),
        }
    }
}

/// What to do with a record that produced anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Keep the record with zero values in place of the bad fields.
    #[default]
    ZeroFill,
    /// Drop the record.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    Missing,
    Malformed,
}

/// A field that could not be decoded as written.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeAnomaly {
    pub field: &'static str,
    pub kind: AnomalyKind,
    /// The offending text; empty for missing fields.
    pub raw: String,
}

impl fmt::Display for DecodeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AnomalyKind::Missing => write!(f, "{}: missing", self.field),
            AnomalyKind::Malformed => write!(f, "{}: cannot parse {:?}", self.field, self.raw),
        }
    }
}

/// A decoded value plus everything that had to be papered over to build it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub anomalies: Vec<DecodeAnomaly>,
}

impl<T> Decoded<T> {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Types a positional field decodes into.
trait FieldValue: FromStr + Default {
    fn representable(&self) -> bool {
        true
    }
}

impl FieldValue for i64 {}

impl FieldValue for f64 {
    /// `nan` and `inf` parse, but JSON has no way to carry them.
    fn representable(&self) -> bool {
        self.is_finite()
    }
}

struct FieldReader<'a> {
    fields: Vec<&'a str>,
    anomalies: Vec<DecodeAnomaly>,
}

impl<'a> FieldReader<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            fields: line.split(',').collect(),
            anomalies: Vec::new(),
        }
    }

    fn parse<T: FieldValue>(&mut self, index: usize, field: &'static str) -> T {
        let Some(raw) = self.fields.get(index).map(|f| f.trim()) else {
            self.anomalies.push(DecodeAnomaly {
                field,
                kind: AnomalyKind::Missing,
                raw: String::new(),
            });
            return T::default();
        };
        match raw.parse::<T>() {
            Ok(v) if v.representable() => v,
            _ => {
                self.anomalies.push(DecodeAnomaly {
                    field,
                    kind: AnomalyKind::Malformed,
                    raw: raw.to_string(),
                });
                T::default()
            }
        }
    }

    fn finish<T>(self, value: T) -> Decoded<T> {
        Decoded {
            value,
            anomalies: self.anomalies,
        }
    }
}

/// Decode one stored measurement line.
pub fn decode_measurement(line: &str, schema: MeasurementSchema) -> Decoded<MeasurementPoint> {
    let mut r = FieldReader::new(line);
    let point = match schema {
        MeasurementSchema::SixField => MeasurementPoint::SixField(SixFieldPoint {
            time: r.parse(0, "time"),
            raw_value: r.parse(1, "raw_value"),
            actual: r.parse(2, "actual"),
            predicted: r.parse(3, "predicted"),
            anomaly: r.parse(4, "anomaly"),
            likelihood: r.parse(5, "likelihood"),
        }),
        MeasurementSchema::FiveField => MeasurementPoint::FiveField(FiveFieldPoint {
            time: r.parse(0, "time"),
            actual: r.parse(1, "actual"),
            predicted: r.parse(2, "predicted"),
            anomaly: r.parse(3, "anomaly"),
            likelihood: r.parse(4, "likelihood"),
        }),
    };
    r.finish(point)
}

/// Render a point in the line format its schema stores.
pub fn encode_measurement(point: &MeasurementPoint) -> String {
    match point {
        MeasurementPoint::SixField(p) => format!(
            "{},{},{},{},{},{}",
            p.time, p.raw_value, p.actual, p.predicted, p.anomaly, p.likelihood
        ),
        MeasurementPoint::FiveField(p) => format!(
            "{},{},{},{},{}",
            p.time, p.actual, p.predicted, p.anomaly, p.likelihood
        ),
    }
}

fn required(
    value: Option<String>,
    field: &'static str,
    anomalies: &mut Vec<DecodeAnomaly>,
) -> String {
    value.unwrap_or_else(|| {
        anomalies.push(DecodeAnomaly {
            field,
            kind: AnomalyKind::Missing,
            raw: String::new(),
        });
        String::new()
    })
}

/// Build a monitor from its enumerated key.
///
/// `lookup` performs a single `GET`; the three dependent lookups run
/// concurrently and each carries its own retry budget.
pub async fn decode_monitor<F, Fut>(
    key: &str,
    keys: &KeyLayout,
    lookup: F,
) -> Result<Decoded<MonitorDescriptor>, PipelineError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Option<String>, PipelineError>>,
{
    let id = keys
        .monitor_id(key)
        .ok_or_else(|| PipelineError::InvalidKey {
            key: key.to_string(),
            prefix: keys.monitor_prefix.clone(),
        })?;

    let (name, value_label, value_unit) = tokio::try_join!(
        lookup(keys.name_key(id)),
        lookup(keys.label_key(id)),
        lookup(keys.unit_key(id)),
    )?;

    let mut anomalies = Vec::new();
    let value = MonitorDescriptor {
        id: id.to_string(),
        name: required(name, "name", &mut anomalies),
        value_label: required(value_label, "value_label", &mut anomalies),
        value_unit: required(value_unit, "value_unit", &mut anomalies),
    };
    Ok(Decoded { value, anomalies })
}

/// Build a check from one entry of the checks list.
pub async fn decode_check<F, Fut>(
    entry: &str,
    keys: &KeyLayout,
    lookup: F,
) -> Result<Decoded<CheckDescriptor>, PipelineError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Option<String>, PipelineError>>,
{
    let mut r = FieldReader {
        fields: vec![entry],
        anomalies: Vec::new(),
    };
    let id: i64 = r.parse(0, "id");
    let name = lookup(keys.check_key(entry)).await?;
    let name = required(name, "name", &mut r.anomalies);
    Ok(r.finish(CheckDescriptor { id, name }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn six_field_line() {
        let decoded = decode_measurement("100,1.0,2.0,3.0,0.1,0.9", MeasurementSchema::SixField);
        assert!(decoded.is_clean());
        let MeasurementPoint::SixField(p) = decoded.value else {
            panic!("expected six-field point");
        };
        assert_eq!(p.time, 100);
        assert!(approx(p.raw_value, 1.0));
        assert!(approx(p.actual, 2.0));
        assert!(approx(p.predicted, 3.0));
        assert!(approx(p.anomaly, 0.1));
        assert!(approx(p.likelihood, 0.9));
    }

    #[test]
    fn five_field_line() {
        let decoded = decode_measurement(
            "1400000000,250,240,0.50000,0.12500",
            MeasurementSchema::FiveField,
        );
        assert!(decoded.is_clean());
        assert_eq!(
            decoded.value,
            MeasurementPoint::FiveField(FiveFieldPoint {
                time: 1_400_000_000,
                actual: 250,
                predicted: 240,
                anomaly: 0.5,
                likelihood: 0.125,
            })
        );
    }

    #[test]
    fn malformed_field_zero_fills_and_reports() {
        let decoded = decode_measurement("100,abc,2.0,3.0,0.1,0.9", MeasurementSchema::SixField);
        let MeasurementPoint::SixField(p) = decoded.value else {
            panic!("expected six-field point");
        };
        assert_eq!(p.raw_value, 0.0);
        assert!(approx(p.actual, 2.0));
        assert_eq!(
            decoded.anomalies,
            vec![DecodeAnomaly {
                field: "raw_value",
                kind: AnomalyKind::Malformed,
                raw: "abc".to_string(),
            }]
        );
    }

    #[test]
    fn short_line_reports_missing_fields() {
        let decoded = decode_measurement("100,5,6", MeasurementSchema::FiveField);
        let fields: Vec<_> = decoded.anomalies.iter().map(|a| a.field).collect();
        assert_eq!(fields, vec!["anomaly", "likelihood"]);
        assert!(decoded.anomalies.iter().all(|a| a.kind == AnomalyKind::Missing));
        assert_eq!(decoded.value.time(), 100);
    }

    #[test]
    fn float_in_integer_schema_is_malformed() {
        let decoded = decode_measurement("100,5.5,6,0.1,0.2", MeasurementSchema::FiveField);
        assert_eq!(decoded.anomalies.len(), 1);
        assert_eq!(decoded.anomalies[0].field, "actual");
        assert_eq!(decoded.anomalies[0].to_string(), r#"actual: cannot parse "5.5""#);
    }

    #[test]
    fn non_finite_floats_are_malformed() {
        let decoded = decode_measurement("100,nan,2,inf,0.1,-Infinity", MeasurementSchema::SixField);
        let MeasurementPoint::SixField(p) = decoded.value else {
            panic!("expected six-field point");
        };
        assert_eq!(p.raw_value, 0.0);
        assert_eq!(p.predicted, 0.0);
        assert_eq!(p.likelihood, 0.0);
        assert!(approx(p.actual, 2.0));
        let fields: Vec<_> = decoded.anomalies.iter().map(|a| a.field).collect();
        assert_eq!(fields, vec!["raw_value", "predicted", "likelihood"]);
        assert!(decoded.anomalies.iter().all(|a| a.kind == AnomalyKind::Malformed));
        assert_eq!(decoded.anomalies[0].raw, "nan");
    }

    #[test]
    fn schema_is_not_guessed() {
        // A six-field line read as five-field shifts every column.
        let decoded = decode_measurement("100,1.0,2.0,3.0,0.1,0.9", MeasurementSchema::FiveField);
        assert!(!decoded.is_clean());
    }

    #[test]
    fn lines_survive_decode_then_encode() {
        let cases = [
            ("100,1.5,2.25,3,0.1,0.9", MeasurementSchema::SixField),
            ("1400000000,250,240,0.5,0.125", MeasurementSchema::FiveField),
            ("-5,0,-7,0.00001,1", MeasurementSchema::FiveField),
        ];
        for (line, schema) in cases {
            let decoded = decode_measurement(line, schema);
            assert!(decoded.is_clean(), "{line}");
            let encoded = encode_measurement(&decoded.value);
            assert_eq!(decode_measurement(&encoded, schema), decoded, "{line}");
        }
    }

    #[test]
    fn schema_names() {
        assert_eq!(
            "six_field".parse::<MeasurementSchema>(),
            Ok(MeasurementSchema::SixField)
        );
        assert_eq!(
            "5".parse::<MeasurementSchema>(),
            Ok(MeasurementSchema::FiveField)
        );
        assert!("nine".parse::<MeasurementSchema>().is_err());
        assert_eq!(MeasurementSchema::FiveField.as_str(), "five_field");
        assert_eq!(MeasurementSchema::SixField.field_count(), 6);
    }

    struct Lookups {
        values: HashMap<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl Lookups {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                seen: Mutex::new(Vec::new()),
            }
        }

        async fn get(&self, key: String) -> Result<Option<String>, PipelineError> {
            self.seen.lock().unwrap().push(key.clone());
            Ok(self.values.get(&key).cloned())
        }
    }

    #[tokio::test]
    async fn monitor_id_is_key_without_prefix() {
        let lookups = Lookups::new(&[
            ("name:sensorA", "CPU"),
            ("value_label:sensorA", "pct"),
            ("value_unit:sensorA", "%"),
        ]);
        let decoded = decode_monitor("name:sensorA", &KeyLayout::default(), |k| lookups.get(k))
            .await
            .unwrap();

        assert!(decoded.is_clean());
        assert_eq!(
            decoded.value,
            MonitorDescriptor {
                id: "sensorA".to_string(),
                name: "CPU".to_string(),
                value_label: "pct".to_string(),
                value_unit: "%".to_string(),
            }
        );
        let mut seen = lookups.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec!["name:sensorA", "value_label:sensorA", "value_unit:sensorA"]
        );
    }

    #[tokio::test]
    async fn monitor_key_without_prefix_is_rejected() {
        let lookups = Lookups::new(&[]);
        let err = decode_monitor("label:x", &KeyLayout::default(), |k| lookups.get(k))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidKey { .. }));
        assert!(lookups.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn monitor_missing_unit_is_reported() {
        let lookups = Lookups::new(&[("name:a", "A"), ("value_label:a", "ms")]);
        let decoded = decode_monitor("name:a", &KeyLayout::default(), |k| lookups.get(k))
            .await
            .unwrap();
        assert_eq!(decoded.value.value_unit, "");
        assert_eq!(decoded.anomalies.len(), 1);
        assert_eq!(decoded.anomalies[0].field, "value_unit");
    }

    #[tokio::test]
    async fn check_entry_is_numeric_id() {
        let lookups = Lookups::new(&[("check:1234", "homepage")]);
        let decoded = decode_check("1234", &KeyLayout::default(), |k| lookups.get(k))
            .await
            .unwrap();
        assert!(decoded.is_clean());
        assert_eq!(
            decoded.value,
            CheckDescriptor {
                id: 1234,
                name: "homepage".to_string()
            }
        );
    }

    #[tokio::test]
    async fn non_numeric_check_entry_is_reported() {
        let lookups = Lookups::new(&[("check:abc", "broken")]);
        let decoded = decode_check("abc", &KeyLayout::default(), |k| lookups.get(k))
            .await
            .unwrap();
        assert_eq!(decoded.value.id, 0);
        assert_eq!(decoded.value.name, "broken");
        assert_eq!(decoded.anomalies[0].kind, AnomalyKind::Malformed);
    }
}
