use serde::Serialize;

/// A check from the `checks` list; the name lives under `check:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckDescriptor {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ChecksResponse {
    pub checks: Vec<CheckDescriptor>,
}
