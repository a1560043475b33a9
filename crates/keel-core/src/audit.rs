//! Audit trail of a request.

use crate::pool::Reset;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// The audit record shared between the audit stage and the handler.
pub type AuditCell = Mutex<AuditRecord>;

/// Identity, timing and outcome of one request.
///
/// Handlers add their own fields with [`set`](Self::set) and name the
/// touched resource with [`set_resource_id`](Self::set_resource_id); the
/// audit stage fills in the rest and hands the record to the flush
/// callback when the request completes.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    user_id: String,
    resource_id: String,
    client_ip: String,
    client_ua: String,
    begin: DateTime<Local>,
    user_data: Map<String, Value>,
    errors: Vec<String>,
}

impl AuditRecord {
    /// Fills in the request's identity and start time.
    pub fn start(
        &mut self,
        user_id: impl Into<String>,
        client_ip: impl Into<String>,
        client_ua: impl Into<String>,
        begin: DateTime<Local>,
    ) {
        self.user_id = user_id.into();
        self.client_ip = client_ip.into();
        self.client_ua = client_ua.into();
        self.begin = begin;
    }

    /// Replaces the user id, e.g. after a login request identified the user.
    pub fn override_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    /// Sets a custom field. `null` values are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        if !value.is_null() {
            self.user_data.insert(key.into(), value);
        }
    }

    /// Returns a custom field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.user_data.get(key)
    }

    /// Names the resource the request acted on.
    pub fn set_resource_id(&mut self, resource_id: impl Into<String>) {
        self.resource_id = resource_id.into();
    }

    /// Records an error message.
    pub fn with_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// User id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Resource id.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Client IP.
    #[must_use]
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    /// Client user agent.
    #[must_use]
    pub fn client_ua(&self) -> &str {
        &self.client_ua
    }

    /// When the request started.
    #[must_use]
    pub fn begin(&self) -> DateTime<Local> {
        self.begin
    }

    /// Custom fields.
    #[must_use]
    pub fn user_data(&self) -> &Map<String, Value> {
        &self.user_data
    }

    /// Custom fields as a JSON object string.
    #[must_use]
    pub fn user_data_json(&self) -> String {
        Value::Object(self.user_data.clone()).to_string()
    }

    /// Recorded errors.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Recorded errors joined with `; `.
    #[must_use]
    pub fn dump_errors(&self) -> String {
        self.errors.join("; ")
    }
}

impl Reset for AuditRecord {
    fn reset(&mut self) {
        self.user_id.clear();
        self.resource_id.clear();
        self.client_ip.clear();
        self.client_ua.clear();
        self.begin = DateTime::<Local>::default();
        self.user_data.clear();
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ignores_null() {
        let mut record = AuditRecord::default();
        record.set("order", 42);
        record.set("note", Value::Null);
        assert_eq!(record.get("order"), Some(&Value::from(42)));
        assert!(record.get("note").is_none());
        assert_eq!(record.user_data_json(), r#"{"order":42}"#);
    }

    #[test]
    fn test_errors_dump() {
        let mut record = AuditRecord::default();
        record.with_error("first");
        record.with_error("second");
        assert_eq!(record.dump_errors(), "first; second");
    }

    #[test]
    fn test_start_and_override() {
        let mut record = AuditRecord::default();
        let now = Local::now();
        record.start("ANONYMOUS_1", "10.0.0.1", "curl/8", now);
        record.override_user_id("alice");
        record.set_resource_id("order-9");
        assert_eq!(record.user_id(), "alice");
        assert_eq!(record.client_ip(), "10.0.0.1");
        assert_eq!(record.client_ua(), "curl/8");
        assert_eq!(record.resource_id(), "order-9");
        assert_eq!(record.begin(), now);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut record = AuditRecord::default();
        record.start("alice", "ip", "ua", Local::now());
        record.set("k", "v");
        record.with_error("boom");
        record.reset();
        assert!(record.user_id().is_empty());
        assert!(record.user_data().is_empty());
        assert!(record.errors().is_empty());
        assert_eq!(record.begin(), DateTime::<Local>::default());
    }
}
