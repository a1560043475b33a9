//! Request trace identity.

use crate::pool::Reset;
use chrono::Local;
use uuid::Uuid;

/// Default header carrying the request identifier.
pub const DEFAULT_TRACE_HEADER: &str = "x-request-id";

/// Identifier and logger for one request.
#[derive(Debug)]
pub struct TraceInfo {
    /// Request identifier.
    pub id: String,
    /// Span named `request` carrying the `trace_id` field.
    pub logger: tracing::Span,
}

impl TraceInfo {
    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the request span.
    #[must_use]
    pub fn logger(&self) -> &tracing::Span {
        &self.logger
    }
}

impl Default for TraceInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            logger: tracing::Span::none(),
        }
    }
}

impl Reset for TraceInfo {
    fn reset(&mut self) {
        self.id.clear();
        self.logger = tracing::Span::none();
    }
}

/// Generates a request identifier: `yyMMdd` followed by 26 random hex digits.
///
/// The date prefix keeps identifiers roughly sortable; the suffix comes from
/// a v4 UUID.
#[must_use]
pub fn generate_trace_id() -> String {
    let mut id = Local::now().format("%y%m%d").to_string();
    let random = Uuid::new_v4().simple().to_string();
    id.push_str(&random[6..]);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id[..6].chars().all(|c| c.is_ascii_digit()));
        assert!(id[6..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(generate_trace_id(), generate_trace_id());
    }

    #[test]
    fn test_reset_clears_id() {
        let mut info = TraceInfo {
            id: "abc".into(),
            logger: tracing::Span::none(),
        };
        info.reset();
        assert!(info.id().is_empty());
        assert!(info.logger().is_none());
    }
}
