//! Span helpers for checkpoint dispatch.

use shadow_rt_core::{Host, SyntaxSite};
use tracing::Span;

/// Span around one checkpoint of a syntax site.
pub fn site_span<H: Host>(site: &SyntaxSite<H>, checkpoint: &'static str) -> Span {
    tracing::trace_span!(
        "shadow_checkpoint",
        checkpoint,
        site = %site.id(),
        label = site.label(),
        categories = %site.categories(),
    )
}
