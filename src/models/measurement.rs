use serde::Serialize;

/// One `time,raw,actual,predicted,anomaly,likelihood` record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SixFieldPoint {
    pub time: i64,
    pub raw_value: f64,
    #[serde(rename = "average_value")]
    pub actual: f64,
    pub predicted: f64,
    pub anomaly: f64,
    pub likelihood: f64,
}

/// One `time,actual,predicted,anomaly,likelihood` record. The check
/// deployments store whole-number response times.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FiveFieldPoint {
    pub time: i64,
    pub actual: i64,
    pub predicted: i64,
    pub anomaly: f64,
    pub likelihood: f64,
}

/// A decoded measurement. Serializes as the bare inner object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasurementPoint {
    SixField(SixFieldPoint),
    FiveField(FiveFieldPoint),
}

impl MeasurementPoint {
    pub fn time(&self) -> i64 {
        match self {
            MeasurementPoint::SixField(p) => p.time,
            MeasurementPoint::FiveField(p) => p.time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub results: Vec<MeasurementPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn six_field_uses_dashboard_key_names() {
        let point = MeasurementPoint::SixField(SixFieldPoint {
            time: 100,
            raw_value: 1.0,
            actual: 2.0,
            predicted: 3.0,
            anomaly: 0.1,
            likelihood: 0.9,
        });
        assert_eq!(
            serde_json::to_value(point).unwrap(),
            json!({
                "time": 100,
                "raw_value": 1.0,
                "average_value": 2.0,
                "predicted": 3.0,
                "anomaly": 0.1,
                "likelihood": 0.9
            })
        );
    }

    #[test]
    fn five_field_keeps_integer_values() {
        let point = MeasurementPoint::FiveField(FiveFieldPoint {
            time: 1_400_000_000,
            actual: 250,
            predicted: 240,
            anomaly: 0.5,
            likelihood: 0.25,
        });
        let body = serde_json::to_string(&point).unwrap();
        assert_eq!(
            body,
            r#"{"time":1400000000,"actual":250,"predicted":240,"anomaly":0.5,"likelihood":0.25}"#
        );
    }
}
