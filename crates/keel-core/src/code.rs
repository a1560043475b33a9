//! Business error codes.
//!
//! Every response envelope carries a numeric `code`. Zero is success; the
//! `44xx` band describes problems with the client's input; anything at or
//! above [`INTERNAL_SERVER`] is a server-side failure whose message is
//! redacted before it leaves the process.
//!
//! | Code | Constant | Default text |
//! |------|----------|--------------|
//! | 0    | [`OK`] | Success |
//! | 2000 | [`OPT_ERR`] | Other error |
//! | 4400 | [`BAD_REQUEST`] | Bad request |
//! | 4401 | [`UNAUTHORIZED`] | Unauthorized or session expired |
//! | 4403 | [`FORBIDDEN`] | Forbidden |
//! | 4404 | [`NOT_FOUND`] | Record not found |
//! | 4409 | [`DUPLICATE_ADD`] | Duplicate record |
//! | 4422 | [`INVALID_PARAMS`] | Invalid request parameters |
//! | 5000 | [`INTERNAL_SERVER`] | Service error |
//! | 6000 | [`INTERNAL_ERR`] | Internal server error |
//! | 6001 | [`RECORD_CREATE_ERR`] | Create failed |
//! | 6002 | [`RECORD_UPDATE_ERR`] | Update failed |
//! | 6003 | [`RECORD_RETRIEVE_ERR`] | Query failed |
//! | 6004 | [`RECORD_DELETE_ERR`] | Delete failed |

/// Success.
pub const OK: i32 = 0;
/// Miscellaneous non-fatal failure.
pub const OPT_ERR: i32 = 2000;
/// The request could not be bound or is otherwise malformed.
pub const BAD_REQUEST: i32 = 4400;
/// No session, or the session expired.
pub const UNAUTHORIZED: i32 = 4401;
/// The caller holds no matching permission.
pub const FORBIDDEN: i32 = 4403;
/// The addressed record does not exist.
pub const NOT_FOUND: i32 = 4404;
/// The record being added already exists.
pub const DUPLICATE_ADD: i32 = 4409;
/// The request was bound but failed validation.
pub const INVALID_PARAMS: i32 = 4422;
/// Generic server failure. Also the redaction threshold.
pub const INTERNAL_SERVER: i32 = 5000;
/// Internal failure reported by the application.
pub const INTERNAL_ERR: i32 = 6000;
/// Persisting a new record failed.
pub const RECORD_CREATE_ERR: i32 = 6001;
/// Updating a record failed.
pub const RECORD_UPDATE_ERR: i32 = 6002;
/// Reading records failed.
pub const RECORD_RETRIEVE_ERR: i32 = 6003;
/// Deleting a record failed.
pub const RECORD_DELETE_ERR: i32 = 6004;

/// Message sent in place of the original for redacted codes.
pub const REDACTED_MESSAGE: &str = "Internal server error, please contact the administrator";

/// Returns the default text for a code.
#[must_use]
pub const fn code_text(code: i32) -> &'static str {
    match code {
        OK => "Success",
        OPT_ERR => "Other error",
        BAD_REQUEST => "Bad request",
        UNAUTHORIZED => "Unauthorized or session expired",
        FORBIDDEN => "Forbidden",
        NOT_FOUND => "Record not found",
        DUPLICATE_ADD => "Duplicate record",
        INVALID_PARAMS => "Invalid request parameters",
        INTERNAL_SERVER => "Service error",
        INTERNAL_ERR => "Internal server error",
        RECORD_CREATE_ERR => "Create failed",
        RECORD_UPDATE_ERR => "Update failed",
        RECORD_RETRIEVE_ERR => "Query failed",
        RECORD_DELETE_ERR => "Delete failed",
        _ => "Unknown error",
    }
}

/// Maps an HTTP status to a business code: `(status / 100) * 1000 + status`.
///
/// `404` becomes `4404` and `500` becomes `5500`.
#[must_use]
pub const fn http_status_to_code(status: u16) -> i32 {
    let status = status as i32;
    (status / 100) * 1000 + status
}

/// Returns `true` if messages carrying this code must be redacted.
#[must_use]
pub const fn is_redacted(code: i32) -> bool {
    code >= INTERNAL_SERVER
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_mapping_examples() {
        assert_eq!(http_status_to_code(400), 4400);
        assert_eq!(http_status_to_code(404), NOT_FOUND);
        assert_eq!(http_status_to_code(405), 4405);
        assert_eq!(http_status_to_code(413), 4413);
        assert_eq!(http_status_to_code(500), 5500);
    }

    #[test]
    fn test_code_text() {
        assert_eq!(code_text(OK), "Success");
        assert_eq!(code_text(FORBIDDEN), "Forbidden");
        assert_eq!(code_text(1234), "Unknown error");
    }

    #[test]
    fn test_redaction_threshold() {
        assert!(!is_redacted(INVALID_PARAMS));
        assert!(is_redacted(INTERNAL_SERVER));
        assert!(is_redacted(5500));
        assert!(is_redacted(RECORD_DELETE_ERR));
    }

    proptest! {
        #[test]
        fn status_mapping_keeps_status_in_low_digits(status in 100u16..600) {
            let code = http_status_to_code(status);
            prop_assert_eq!(code % 1000, i32::from(status));
            prop_assert_eq!(code / 1000, i32::from(status / 100));
        }

        #[test]
        fn server_statuses_are_redacted(status in 500u16..600) {
            prop_assert!(is_redacted(http_status_to_code(status)));
        }
    }
}
