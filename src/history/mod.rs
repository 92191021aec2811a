//! History Window
//!
//! Windowed view over a metric series fetched from the Telemetry Store. A
//! series is an immutable snapshot; its day partition (first sample index of
//! every local calendar day) is computed once per load. Zoom, pan and day
//! selection only move the visible window or the highlight over that fixed
//! snapshot and never trigger a refetch.

pub mod store;

pub use store::{HttpTelemetryStore, TelemetryStore};

use crate::error::HistoryError;
use crate::models::HistoryPoint;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Hours requested when a lifetime query comes back empty (five years).
pub const LIFETIME_FALLBACK_HOURS: u32 = 24 * 365 * 5;

/// Smallest number of samples a zoomed window may show.
pub const MIN_VISIBLE: usize = 10;

pub const ZOOM_STEP: f64 = 1.5;

static METRIC_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_.]{0,63}$").unwrap()
});

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Time range of a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRange {
    Hours(u32),
    Lifetime,
}

impl HistoryRange {
    /// Value of the `hours` query parameter.
    pub fn query_value(&self) -> String {
        match self {
            HistoryRange::Hours(h) => h.to_string(),
            HistoryRange::Lifetime => "lifetime".to_string(),
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryRange::Hours(h) => write!(f, "last {}h", h),
            HistoryRange::Lifetime => write!(f, "lifetime"),
        }
    }
}

impl FromStr for HistoryRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("lifetime") {
            return Ok(HistoryRange::Lifetime);
        }
        match s.parse::<u32>() {
            Ok(h) if h > 0 => Ok(HistoryRange::Hours(h)),
            _ => Err(format!("Invalid history range '{}': expected hours or 'lifetime'", s)),
        }
    }
}

/// Check a metric name before it is put into a query string.
pub fn validate_metric(metric: &str) -> Result<(), HistoryError> {
    if METRIC_NAME.is_match(metric) {
        Ok(())
    } else {
        Err(HistoryError::InvalidMetric(metric.to_string()))
    }
}

/// Display unit derived from the metric name.
pub fn unit_for(metric: &str) -> &'static str {
    if metric.contains("utilization") || metric.contains("percent") {
        "%"
    } else if metric.contains("memory_used") {
        "MB"
    } else if metric.contains("temperature") {
        "C"
    } else if metric.contains("power") {
        "W"
    } else {
        ""
    }
}

/// Parse a store timestamp into epoch milliseconds.
///
/// Timestamps without an offset are local time.
pub fn parse_timestamp(raw: &str) -> Result<i64, HistoryError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis())
                .ok_or_else(|| HistoryError::InvalidTimestamp(raw.to_string()));
        }
    }
    Err(HistoryError::InvalidTimestamp(raw.to_string()))
}

/// Indices where a new calendar day of `tz` begins. Always starts with 0 for
/// a non-empty series.
pub fn compute_day_partition_in<Tz: TimeZone>(timestamps: &[i64], tz: &Tz) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut prev_day = None;
    for (i, &ms) in timestamps.iter().enumerate() {
        let day = tz.timestamp_millis_opt(ms).single().map(|dt| dt.date_naive());
        if i == 0 || day != prev_day {
            starts.push(i);
            prev_day = day;
        }
    }
    starts
}

/// Day partition in the local time zone.
pub fn compute_day_partition(timestamps: &[i64]) -> Vec<usize> {
    compute_day_partition_in(timestamps, &Local)
}

/// Immutable snapshot of one metric series plus its day partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySeries {
    timestamps: Vec<i64>,
    values: Vec<f64>,
    day_starts: Vec<usize>,
}

impl HistorySeries {
    /// Build a snapshot from raw store points, partitioned by local day.
    pub fn from_points(points: &[HistoryPoint]) -> Result<Self, HistoryError> {
        Self::from_points_in(points, &Local)
    }

    pub fn from_points_in<Tz: TimeZone>(points: &[HistoryPoint], tz: &Tz) -> Result<Self, HistoryError> {
        let mut timestamps = Vec::with_capacity(points.len());
        let mut values = Vec::with_capacity(points.len());
        for point in points {
            timestamps.push(parse_timestamp(&point.timestamp)?);
            values.push(point.value);
        }
        let day_starts = compute_day_partition_in(&timestamps, tz);
        Ok(HistorySeries {
            timestamps,
            values,
            day_starts,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn day_starts(&self) -> &[usize] {
        &self.day_starts
    }

    /// True when the series spans at least 24 hours.
    pub fn is_multi_day(&self) -> bool {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first >= MS_PER_DAY,
            _ => false,
        }
    }

    /// Inclusive index range of day `day`.
    fn day_range(&self, day: usize) -> Option<(usize, usize)> {
        let start = *self.day_starts.get(day)?;
        let end = self
            .day_starts
            .get(day + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len() - 1);
        Some((start, end))
    }
}

/// Summary statistics of a slice of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Zoomable, pannable view over a `HistorySeries`.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    metric: Option<String>,
    series: HistorySeries,
    visible_start: usize,
    visible_end: usize,
    selected_day: Option<usize>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window showing all of `series`.
    pub fn from_series(series: HistorySeries) -> Self {
        let mut window = HistoryWindow {
            series,
            ..Self::default()
        };
        window.reset_zoom();
        window
    }

    /// Fetch `metric` from the store and replace the resident series.
    ///
    /// A lifetime request that comes back empty is retried once with
    /// `LIFETIME_FALLBACK_HOURS`; a failing fallback keeps the empty series.
    /// On error the previous series is left untouched.
    pub async fn load(
        &mut self,
        store: &dyn TelemetryStore,
        metric: &str,
        range: HistoryRange,
    ) -> Result<(), HistoryError> {
        validate_metric(metric)?;

        let mut points = store.history(metric, &range.query_value()).await?;
        if range == HistoryRange::Lifetime && points.is_empty() {
            log::info!(
                "[History] Lifetime query for {} was empty, retrying with {}h",
                metric,
                LIFETIME_FALLBACK_HOURS
            );
            let hours = LIFETIME_FALLBACK_HOURS.to_string();
            match store.history(metric, &hours).await {
                Ok(fallback) => points = fallback,
                Err(e) => log::warn!("[History] Lifetime fallback failed: {}", e),
            }
        }

        let series = HistorySeries::from_points(&points)?;
        log::info!(
            "[History] Loaded {} points of {} ({}) across {} days",
            series.len(),
            metric,
            range,
            series.day_starts().len()
        );
        self.replace(metric, series);
        Ok(())
    }

    /// Install a new snapshot: full view, no selection.
    pub fn replace(&mut self, metric: &str, series: HistorySeries) {
        self.metric = Some(metric.to_string());
        self.series = series;
        self.selected_day = None;
        self.reset_zoom();
    }

    pub fn metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    pub fn series(&self) -> &HistorySeries {
        &self.series
    }

    /// Inclusive visible index range, `None` for an empty series.
    pub fn visible_range(&self) -> Option<(usize, usize)> {
        if self.series.is_empty() {
            None
        } else {
            Some((self.visible_start, self.visible_end))
        }
    }

    /// `(timestamp_ms, value)` pairs inside the visible window.
    pub fn visible(&self) -> Vec<(i64, f64)> {
        match self.visible_range() {
            Some((start, end)) => (start..=end)
                .map(|i| (self.series.timestamps[i], self.series.values[i]))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn visible_stats(&self) -> Option<WindowStats> {
        let (start, end) = self.visible_range()?;
        let values = &self.series.values[start..=end];
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(WindowStats { min, max, mean })
    }

    pub fn reset_zoom(&mut self) {
        self.visible_start = 0;
        self.visible_end = self.series.len().saturating_sub(1);
    }

    /// Rescale the visible window around its center; `factor > 1` zooms in.
    ///
    /// The window never shrinks below `MIN_VISIBLE` samples; growing it to
    /// the full series length resets the zoom.
    pub fn zoom(&mut self, factor: f64) {
        let len = self.series.len();
        if len == 0 || !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let cur_len = self.visible_end - self.visible_start + 1;
        let new_len = ((cur_len as f64 / factor).round() as usize).max(MIN_VISIBLE);
        if new_len >= len {
            self.reset_zoom();
            return;
        }

        let center = (self.visible_start + self.visible_end) / 2;
        let mut start = center.saturating_sub(new_len / 2);
        let end = (start + new_len - 1).min(len - 1);
        if end - start + 1 < new_len {
            start = (end + 1).saturating_sub(new_len);
        }
        self.visible_start = start;
        self.visible_end = end;
    }

    pub fn zoom_in(&mut self) {
        self.zoom(ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.zoom(1.0 / ZOOM_STEP);
    }

    /// Shift the window by `delta` samples, keeping its width.
    pub fn pan(&mut self, delta: isize) {
        let len = self.series.len();
        if len == 0 {
            return;
        }
        let width = self.visible_end - self.visible_start;
        let max_start = len - 1 - width;
        let start = (self.visible_start as isize + delta).clamp(0, max_start as isize) as usize;
        self.visible_start = start;
        self.visible_end = start + width;
    }

    /// Select a day for highlighting, or clear the selection.
    pub fn select_day(&mut self, day: Option<usize>) {
        self.selected_day = day;
    }

    pub fn selected_day(&self) -> Option<usize> {
        self.selected_day
    }

    /// Day containing sample `index`.
    pub fn day_of(&self, index: usize) -> Option<usize> {
        if index >= self.series.len() {
            return None;
        }
        self.series
            .day_starts
            .iter()
            .rposition(|&start| start <= index)
    }

    /// Inclusive index range of the selected day. `None` when nothing is
    /// selected or the selection is out of range.
    pub fn highlight_range(&self) -> Option<(usize, usize)> {
        self.series.day_range(self.selected_day?)
    }

    /// Inclusive index range of every day, for alternating bands.
    pub fn day_bands(&self) -> Vec<(usize, usize)> {
        (0..self.series.day_starts.len())
            .filter_map(|day| self.series.day_range(day))
            .collect()
    }
}
