//! Request-scoped metric context.
//!
//! A [`MetricsContext`] is created by the framework entry point when a request arrives and is
//! only read afterwards by the timing reporters. It carries the request start time, the route
//! being handled and an optional set of ad-hoc tags that are attached to every derived metric.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::reporter::Labels;

/// Typed metadata attached to one request's lifetime.
///
/// The start time and route are always present. The tag map is optional and shared between
/// derived copies until one of them adds a tag.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsContext {
    start_time: i64,
    route: String,
    tags: Option<Arc<Labels>>,
}

impl MetricsContext {
    /// Creates a context for `route` that starts now.
    pub fn new<R>(route: R) -> Self
    where
        R: Into<String>,
    {
        Self::with_start_time(route, now_nanos())
    }

    /// Creates a context for `route` started at `start_time` nanoseconds since the Unix epoch.
    pub fn with_start_time<R>(route: R, start_time: i64) -> Self
    where
        R: Into<String>,
    {
        Self {
            start_time,
            route: route.into(),
            tags: None,
        }
    }

    /// Returns a copy of this context carrying `tags` as its ad-hoc tag map.
    #[must_use]
    pub fn with_tags(mut self, tags: Labels) -> Self {
        self.tags = Some(Arc::new(tags));
        self
    }

    /// Returns a copy of this context with one more ad-hoc tag.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let tags = self.tags.get_or_insert_with(Default::default);
        Arc::make_mut(tags).insert(key.into(), value.into());
        self
    }
}

/// Start time of the request, in nanoseconds since the Unix epoch.
pub fn start_time(ctx: &MetricsContext) -> i64 {
    ctx.start_time
}

/// Route being handled by the request.
pub fn route(ctx: &MetricsContext) -> &str {
    &ctx.route
}

/// Ad-hoc tags attached to the request, or an empty map when none were attached.
pub fn tags_from_context(ctx: &MetricsContext) -> Labels {
    ctx.tags.as_deref().cloned().unwrap_or_default()
}

/// Time elapsed since the request started.
///
/// A start time in the future yields a zero duration.
pub fn elapsed(ctx: &MetricsContext) -> Duration {
    let elapsed = now_nanos().saturating_sub(ctx.start_time);
    Duration::from_nanos(u64::try_from(elapsed).unwrap_or(0))
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
