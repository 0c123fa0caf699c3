//! Derived metrics every server call site needs.
//!
//! These helpers fan a single semantic event out to every configured reporter. Errors returned
//! by individual reporters are ignored and delivery to the remaining reporters continues.

use std::sync::Arc;

use crate::common::{CONNECTED_CLIENTS, EXCEEDED_RATE_LIMITING, PROCESS_DELAY, RESPONSE_TIME};
use crate::context::{self, MetricsContext};
use crate::reporter::{Labels, Reporter};

/// Code reported for errors that carry no structured code.
pub const UNKNOWN_ERROR_CODE: &str = "GAME-000";

/// Extracts a structured code from an error.
///
/// The code taxonomy belongs to the application. Errors without one can rely on the default
/// implementation and are reported with [`UNKNOWN_ERROR_CODE`].
pub trait ErrorCode {
    /// Structured code carried by this error, if any.
    fn error_code(&self) -> Option<&str> {
        None
    }
}

/// Resolves the `code` tag for an optional error.
pub fn error_code(err: Option<&dyn ErrorCode>) -> String {
    match err {
        None => String::new(),
        Some(err) => err.error_code().unwrap_or(UNKNOWN_ERROR_CODE).to_owned(),
    }
}

/// Reports the time spent handling the request as the `response_time` summary.
///
/// Tags are `route`, `status` ("ok" or "failed"), `type` and `code`, merged with the context's
/// ad-hoc tags. The four reserved keys always win over ad-hoc tags of the same name.
pub fn report_timing_from_ctx(
    ctx: Option<&MetricsContext>,
    reporters: &[Arc<dyn Reporter>],
    typ: &str,
    err: Option<&dyn ErrorCode>,
) {
    let Some(ctx) = ctx else {
        return;
    };
    if reporters.is_empty() {
        return;
    }

    let status = if err.is_some() { "failed" } else { "ok" };
    let elapsed = context::elapsed(ctx);
    let tags = tags_with_reserved(
        ctx,
        [
            ("route", context::route(ctx).to_owned()),
            ("status", status.to_owned()),
            ("type", typ.to_owned()),
            ("code", error_code(err)),
        ],
    );

    for reporter in reporters {
        let _ = reporter.report_summary(RESPONSE_TIME, &tags, elapsed.as_nanos() as f64);
    }
}

/// Reports the time a message waited before its processing started as the `process_delay`
/// summary, tagged with `route` and `type` plus the context's ad-hoc tags.
pub fn report_message_process_delay_from_ctx(
    ctx: Option<&MetricsContext>,
    reporters: &[Arc<dyn Reporter>],
    typ: &str,
) {
    let Some(ctx) = ctx else {
        return;
    };
    if reporters.is_empty() {
        return;
    }

    let elapsed = context::elapsed(ctx);
    let tags = tags_with_reserved(
        ctx,
        [
            ("route", context::route(ctx).to_owned()),
            ("type", typ.to_owned()),
        ],
    );

    for reporter in reporters {
        let _ = reporter.report_summary(PROCESS_DELAY, &tags, elapsed.as_nanos() as f64);
    }
}

/// Reports the number of currently connected clients.
pub fn report_number_of_connected_clients(reporters: &[Arc<dyn Reporter>], number: i64) {
    let tags = Labels::new();
    for reporter in reporters {
        let _ = reporter.report_gauge(CONNECTED_CLIENTS, &tags, number as f64);
    }
}

/// Counts one request rejected by rate limiting.
pub fn report_exceeded_rate_limiting(reporters: &[Arc<dyn Reporter>]) {
    let tags = Labels::new();
    for reporter in reporters {
        let _ = reporter.report_count(EXCEEDED_RATE_LIMITING, &tags, 1.0);
    }
}

fn tags_with_reserved<const N: usize>(
    ctx: &MetricsContext,
    reserved: [(&str, String); N],
) -> Labels {
    let mut tags = context::tags_from_context(ctx);
    for (key, value) in reserved {
        tags.insert(key.to_owned(), value);
    }
    tags
}
