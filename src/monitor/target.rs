use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Interval used when a configured interval is missing or malformed.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_METHOD: &str = "GET";
pub const DEFAULT_EXPECT_STATUS: u16 = 200;

/// What a target is probed with, and the parameters each protocol needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeKind {
    Http {
        url: String,
        method: String,
        expect_status: u16,
    },
    Tcp {
        host: String,
        port: u16,
    },
    Icmp {
        host: String,
    },
    /// Type was unset or unrecognised. Probed as HTTP when a URL is known.
    Unknown {
        url: Option<String>,
    },
}

impl ProbeKind {
    pub fn http(url: impl Into<String>) -> Self {
        ProbeKind::Http {
            url: url.into(),
            method: DEFAULT_HTTP_METHOD.to_string(),
            expect_status: DEFAULT_EXPECT_STATUS,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeKind::Http { .. } => "http",
            ProbeKind::Tcp { .. } => "tcp",
            ProbeKind::Icmp { .. } => "icmp",
            ProbeKind::Unknown { .. } => "unknown",
        }
    }
}

/// One configured endpoint. Immutable once the engine has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: String,
    pub kind: ProbeKind,
    /// Raw per-target override of the global check interval.
    pub interval: Option<String>,
}

impl Target {
    pub fn new(name: impl Into<String>, kind: ProbeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    /// The target's own interval when it has one, otherwise `global`.
    pub fn effective_interval(&self, global: Duration) -> Duration {
        match self.interval.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => interval_or_default(raw),
            _ => global,
        }
    }
}

/// Parses a duration in the `"1h30m"`, `"45s"`, `"250ms"`, `"1.5s"` notation.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare number is only
/// accepted for `"0"`.
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let mut rest = raw.trim();
    if rest.is_empty() {
        return None;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }

    let mut total_secs = 0f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let value: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total_secs += value * scale;
    }

    Duration::try_from_secs_f64(total_secs).ok()
}

/// Like [`parse_interval`], but never fails: malformed or zero intervals fall
/// back to [`DEFAULT_INTERVAL`].
pub fn interval_or_default(raw: &str) -> Duration {
    match parse_interval(raw) {
        Some(interval) if !interval.is_zero() => interval,
        _ => {
            warn!(interval = %raw, fallback = ?DEFAULT_INTERVAL, "Unusable check interval, using default.");
            DEFAULT_INTERVAL
        }
    }
}
