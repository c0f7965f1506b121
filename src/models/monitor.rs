use serde::Serialize;

/// A monitored metric source, assembled from `name:<id>`,
/// `value_label:<id>` and `value_unit:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorDescriptor {
    pub id: String,
    pub name: String,
    pub value_label: String,
    pub value_unit: String,
}

#[derive(Debug, Serialize)]
pub struct MonitorsResponse {
    pub monitors: Vec<MonitorDescriptor>,
}
