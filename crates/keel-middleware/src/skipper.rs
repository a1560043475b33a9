//! Skip predicates for stages that can be bypassed per request.

use keel_core::RequestView;
use std::sync::Arc;

/// Decides whether a stage should bypass its logic for a request.
pub type Skipper = Arc<dyn Fn(&RequestView) -> bool + Send + Sync>;

/// A skipper that never skips.
#[must_use]
pub fn never() -> Skipper {
    Arc::new(|_| false)
}

/// Skips requests whose path starts with any of `prefixes`.
#[must_use]
pub fn path_prefixes<I, S>(prefixes: I) -> Skipper
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
    Arc::new(move |view| prefixes.iter().any(|p| view.path().starts_with(p.as_str())))
}
