//! Text rendering of observation lists, and the hook that shows them on change.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{DisplayConfig, DisplayStyle};
use crate::domain::{Observation, Severity, Status};
use crate::hooks::{HookHandler, HookRegistry, HookResult, OBSERVATIONS_CHANGE};
use crate::query::{count_by_severity, count_by_status, sort_observations, SortBy};

pub const DISPLAY_HOOK_NAME: &str = "observations-display";

/// Runs after other `observations:change` handlers.
pub const DISPLAY_HOOK_PRIORITY: i32 = 100;

const BAR_WIDTH: usize = 20;
const RULE_WIDTH: usize = 60;
const TABLE_ROWS: usize = 10;
const CONTENT_WIDTH: usize = 30;

pub fn render(style: DisplayStyle, observations: &[Observation]) -> String {
    match style {
        DisplayStyle::Compact => render_compact(observations),
        DisplayStyle::Table => render_table(observations),
        DisplayStyle::ProgressBar => render_progress_bar(observations),
    }
}

/// `Observations: 2 open, 1 ack, 3 done (1 critical)`
pub fn render_compact(observations: &[Observation]) -> String {
    let by_status = count_by_status(observations);
    let by_severity = count_by_severity(observations);
    let status = |s: Status| by_status.get(s.as_str()).copied().unwrap_or(0);
    let severity = |s: Severity| by_severity.get(s.as_str()).copied().unwrap_or(0);

    let critical = severity(Severity::Critical);
    let high = severity(Severity::High);
    let suffix = if critical > 0 {
        format!(" ({critical} critical)")
    } else if high > 0 {
        format!(" ({high} high)")
    } else {
        String::new()
    };

    format!(
        "Observations: {} open, {} ack, {} done{suffix}",
        status(Status::Open),
        status(Status::Acknowledged),
        status(Status::Resolved),
    )
}

/// `Observations: [=====~~~~~          ] 1/4 !1 ^2`
pub fn render_progress_bar(observations: &[Observation]) -> String {
    if observations.is_empty() {
        return "Observations: [No observations]".to_string();
    }

    let total = observations.len();
    let by_status = count_by_status(observations);
    let resolved = by_status.get(Status::Resolved.as_str()).copied().unwrap_or(0);
    let acknowledged = by_status
        .get(Status::Acknowledged.as_str())
        .copied()
        .unwrap_or(0);

    let resolved_width = resolved * BAR_WIDTH / total;
    let ack_width = acknowledged * BAR_WIDTH / total;
    let open_width = BAR_WIDTH.saturating_sub(resolved_width + ack_width);
    let bar = format!(
        "{}{}{}",
        "=".repeat(resolved_width),
        "~".repeat(ack_width),
        " ".repeat(open_width)
    );

    let by_severity = count_by_severity(observations);
    let mut markers = String::new();
    for (severity, marker) in [(Severity::Critical, '!'), (Severity::High, '^')] {
        if let Some(n) = by_severity.get(severity.as_str()).filter(|n| **n > 0) {
            markers.push_str(&format!(" {marker}{n}"));
        }
    }

    format!("Observations: [{bar}] {resolved}/{total}{markers}")
}

/// Fixed-width table of the ten most severe observations.
pub fn render_table(observations: &[Observation]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut lines = vec![
        "Observations:".to_string(),
        rule.clone(),
        format!(
            "{:<10} {:<20} {:<12} {:<30}",
            "Severity", "Observer", "Status", "Content"
        ),
        rule.clone(),
    ];

    let mut sorted = observations.to_vec();
    sort_observations(&mut sorted, SortBy::Severity);

    for obs in sorted.iter().take(TABLE_ROWS) {
        lines.push(format!(
            "{:<10} {:<20} {:<12} {}",
            clip(obs.severity().as_str(), 10),
            clip(obs.observer(), 20),
            clip(obs.status().as_str(), 12),
            shorten(obs.content(), CONTENT_WIDTH),
        ));
    }

    if observations.len() > TABLE_ROWS {
        lines.push(format!("... and {} more", observations.len() - TABLE_ROWS));
    }
    lines.push(rule);

    lines.join("\n")
}

fn clip(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

/// Cut to `width` chars, ending in `...` when anything was dropped.
fn shorten(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let mut out = clip(s, width - 3);
        out.push_str("...");
        out
    } else {
        s.to_string()
    }
}

/// Renders the list carried by `observations:change` when it is worth showing.
///
/// Remembers the size and resolved count of the last list it saw. It displays
/// when the list grew (`show_on_create`), when more observations are resolved
/// than before (`show_on_resolve`), or when the size changed at all
/// (`show_on_change`).
pub struct ObservationDisplayHook {
    config: DisplayConfig,
    last_count: AtomicUsize,
    last_resolved: AtomicUsize,
}

impl ObservationDisplayHook {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            last_count: AtomicUsize::new(0),
            last_resolved: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Register on `registry` for `observations:change`.
    pub fn register(self, registry: &mut HookRegistry) -> Arc<Self> {
        let hook = Arc::new(self);
        registry.register(
            OBSERVATIONS_CHANGE,
            DISPLAY_HOOK_NAME,
            DISPLAY_HOOK_PRIORITY,
            hook.clone(),
        );
        hook
    }

    fn observations_from(data: &serde_json::Value) -> Vec<Observation> {
        let Some(items) = data.get("observations").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| Observation::from_dict(item.clone()).ok())
            .collect()
    }
}

#[async_trait]
impl HookHandler for ObservationDisplayHook {
    async fn handle(&self, event: &str, data: &serde_json::Value) -> HookResult {
        let observations = Self::observations_from(data);
        if observations.is_empty() {
            return HookResult::Continue;
        }

        let count = observations.len();
        let resolved = observations
            .iter()
            .filter(|o| o.status() == Status::Resolved)
            .count();
        let last_count = self.last_count.swap(count, Ordering::Relaxed);
        let last_resolved = self.last_resolved.swap(resolved, Ordering::Relaxed);

        let show = (self.config.show_on_create && count > last_count)
            || (self.config.show_on_resolve && resolved > last_resolved)
            || (self.config.show_on_change && count != last_count);

        debug!(event = %event, count, last_count, resolved, show, "display hook evaluated");
        if !show {
            return HookResult::Continue;
        }

        HookResult::Display {
            content: render(self.config.style, &observations),
        }
    }
}
