//! Aggregated health report.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::traits::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// The registry has not built a client for this backend
    NotInitialized,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::NotInitialized => "not_initialized",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of every backend at the time of the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthReport {
    statuses: BTreeMap<Backend, HealthStatus>,
}

impl HealthReport {
    /// Report with every backend `NotInitialized`.
    pub fn new() -> Self {
        Self {
            statuses: Backend::all()
                .into_iter()
                .map(|b| (b, HealthStatus::NotInitialized))
                .collect(),
        }
    }

    pub fn set(&mut self, backend: Backend, status: HealthStatus) {
        self.statuses.insert(backend, status);
    }

    pub fn status(&self, backend: Backend) -> HealthStatus {
        self.statuses
            .get(&backend)
            .copied()
            .unwrap_or(HealthStatus::NotInitialized)
    }

    pub fn all_healthy(&self) -> bool {
        self.statuses.values().all(|s| *s == HealthStatus::Healthy)
    }

    /// Backends that are not healthy, initialized or not.
    pub fn failing(&self) -> Vec<Backend> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s != HealthStatus::Healthy)
            .map(|(b, _)| *b)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Backend, HealthStatus)> + '_ {
        self.statuses.iter().map(|(b, s)| (*b, *s))
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_not_initialized() {
        let report = HealthReport::new();
        assert_eq!(report.iter().count(), 4);
        assert!(report.iter().all(|(_, s)| s == HealthStatus::NotInitialized));
        assert!(!report.all_healthy());
    }

    #[test]
    fn test_failing_backends() {
        let mut report = HealthReport::new();
        for backend in Backend::all() {
            report.set(backend, HealthStatus::Healthy);
        }
        assert!(report.all_healthy());

        report.set(Backend::Cache, HealthStatus::Unhealthy);
        assert_eq!(report.failing(), vec![Backend::Cache]);
    }

    #[test]
    fn test_json_shape() {
        let mut report = HealthReport::new();
        report.set(Backend::Query, HealthStatus::Healthy);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["query"], "healthy");
        assert_eq!(json["object_store"], "not_initialized");
    }
}
