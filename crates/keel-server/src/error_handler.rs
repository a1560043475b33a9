//! Global error handler.
//!
//! Runs once per request after the pipeline has produced its response. A
//! response committed by the handler replaces whatever the pipeline
//! returned; server failures are logged.

use keel_core::{CommitSlot, ErrorOutcome, Response};
use tracing::warn;

/// Finishes the response for `path`.
pub fn finish(commit: &CommitSlot, path: &str, response: Response) -> Response {
    if let Some(committed) = commit.take() {
        return committed;
    }
    if let Some(outcome) = response.extensions().get::<ErrorOutcome>() {
        if outcome.is_server_failure() {
            warn!(
                path,
                err_category = outcome.category.tag(),
                error = %outcome.detail,
                "api global error handler"
            );
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use keel_core::envelope::error_response;
    use keel_core::{code, WebError};

    #[tokio::test]
    async fn test_committed_response_replaces_pipeline_response() {
        let commit = CommitSlot::new();
        commit
            .commit(Response::new(Full::new(Bytes::from_static(b"mine"))))
            .unwrap();

        let response = finish(&commit, "/x", error_response(&WebError::forbidden()));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"mine");
    }

    #[test]
    fn test_passes_through_outcome() {
        let response = finish(
            &CommitSlot::new(),
            "/x",
            error_response(&WebError::internal("disk full")),
        );
        let outcome = response.extensions().get::<ErrorOutcome>().unwrap();
        assert_eq!(outcome.code, code::INTERNAL_SERVER);
        assert!(outcome.is_server_failure());
    }
}
