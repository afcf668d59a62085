use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use arca_types::{ModelId, RecordKey};

/// A problem with one record, field or attachment during a restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestoreIssue {
    pub record: RecordKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl RestoreIssue {
    pub fn new(record: RecordKey, message: impl Into<String>) -> Self {
        Self {
            record,
            field: None,
            message: message.into(),
        }
    }

    pub fn on_field(record: RecordKey, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record,
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for RestoreIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}: {}", self.record, field, self.message),
            None => write!(f, "{}: {}", self.record, self.message),
        }
    }
}

/// Outcome of a restore that got past its pre-flight checks.
///
/// Records that failed are listed in `errors`; the restore carried on
/// without them. `warnings` covers references that had to be cleared or
/// dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub created_per_model: BTreeMap<ModelId, u64>,
    pub skipped_per_model: BTreeMap<ModelId, u64>,
    pub errors: Vec<RestoreIssue>,
    pub warnings: Vec<RestoreIssue>,
    pub attachments_restored: u64,
    /// Lower bound of the archive when it was an incremental backup.
    pub incremental_since: Option<DateTime<Utc>>,
    /// Whether records received freshly generated primary keys.
    pub remapped: bool,
}

impl RestoreReport {
    pub(crate) fn record_created(&mut self, model: &ModelId) {
        *self.created_per_model.entry(model.clone()).or_insert(0) += 1;
    }

    pub(crate) fn record_skipped(&mut self, model: &ModelId) {
        *self.skipped_per_model.entry(model.clone()).or_insert(0) += 1;
    }

    pub fn total_created(&self) -> u64 {
        self.created_per_model.values().sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped_per_model.values().sum()
    }

    /// No errors and no warnings.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_types::PrimaryKey;

    fn key() -> RecordKey {
        RecordKey::new(ModelId::new("core.control").unwrap(), PrimaryKey::generate())
    }

    #[test]
    fn totals_sum_models() {
        let mut report = RestoreReport::default();
        let a = ModelId::new("core.a").unwrap();
        let b = ModelId::new("core.b").unwrap();
        report.record_created(&a);
        report.record_created(&a);
        report.record_created(&b);
        report.record_skipped(&b);
        assert_eq!(report.total_created(), 3);
        assert_eq!(report.total_skipped(), 1);
        assert_eq!(report.created_per_model[&a], 2);
        assert!(report.is_clean());
    }

    #[test]
    fn warnings_make_report_unclean() {
        let mut report = RestoreReport::default();
        report
            .warnings
            .push(RestoreIssue::on_field(key(), "framework", "reference cleared"));
        assert!(!report.is_clean());
    }

    #[test]
    fn issue_display_names_field() {
        let k = key();
        let issue = RestoreIssue::on_field(k.clone(), "framework", "reference cleared");
        assert_eq!(issue.to_string(), format!("{k}.framework: reference cleared"));
        let issue = RestoreIssue::new(k.clone(), "create failed");
        assert_eq!(issue.to_string(), format!("{k}: create failed"));
    }

    #[test]
    fn report_serializes_model_keys_as_strings() {
        let mut report = RestoreReport::default();
        report.record_created(&ModelId::new("core.a").unwrap());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["created_per_model"]["core.a"], 1);
        assert_eq!(json["remapped"], false);
    }
}
