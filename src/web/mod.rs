//! Status dashboard: an HTML grid of recent checks plus a small JSON API.
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Html,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::{Context, Tera};
use tracing::error;

use crate::monitor::{CheckResult, Target};
use crate::store::SqliteStore;

pub mod error;

pub use error::WebError;

/// Number of checks shown per monitor on the dashboard.
pub const GRID_SIZE: u32 = 90;
const MAX_HISTORY_LIMIT: u32 = 1000;

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="60">
  <title>Status</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 960px; margin: 2rem auto; color: #222; }
    .monitor { margin-bottom: 1.5rem; }
    .head { display: flex; justify-content: space-between; align-items: baseline; }
    .badge { font-weight: 600; }
    .badge.up { color: #2e9e5b; } .badge.down { color: #d64541; } .badge.pending { color: #888; }
    .grid { display: flex; gap: 2px; margin-top: .4rem; }
    .dot { width: 8px; height: 22px; border-radius: 2px; background: #ddd; }
    .dot.up { background: #2ecc71; } .dot.down { background: #e74c3c; }
    footer { color: #888; font-size: .8rem; }
  </style>
</head>
<body>
  <h1>Status</h1>
  {% for m in monitors %}
  <section class="monitor">
    <div class="head">
      <h2>{{ m.name }} <small>{{ m.kind }}</small></h2>
      <span class="badge {{ m.status }}">{{ m.status | upper }}{% if m.uptime_percent is number %} &middot; {{ m.uptime_percent | round(precision=2) }}%{% endif %}</span>
    </div>
    <div class="grid">
      {% for c in m.checks %}<div class="dot {% if c.success %}up{% else %}down{% endif %}" title="{{ c.title }}"></div>{% endfor %}
    </div>
  </section>
  {% else %}
  <p>No monitors configured.</p>
  {% endfor %}
  <footer>Generated {{ now }}</footer>
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    store: Arc<SqliteStore>,
    monitors: Arc<Vec<Target>>,
    templates: Arc<Tera>,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, monitors: Vec<Target>) -> Result<Self, WebError> {
        let mut templates = Tera::default();
        templates.add_raw_template("index.html", INDEX_TEMPLATE)?;
        Ok(Self {
            store,
            monitors: Arc::new(monitors),
            templates: Arc::new(templates),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/monitors/{name}/history", get(api_history))
        .with_state(state)
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub name: String,
    pub kind: &'static str,
    /// Latest recorded outcome; `None` before the first check.
    pub is_up: Option<bool>,
    pub last_checked: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub uptime_percent: Option<f64>,
}

impl MonitorSummary {
    fn from_history(target: &Target, history: &[CheckResult]) -> Self {
        let latest = history.last();
        let uptime_percent = (!history.is_empty()).then(|| {
            let up = history.iter().filter(|r| r.success).count();
            up as f64 * 100.0 / history.len() as f64
        });
        Self {
            name: target.name.clone(),
            kind: target.kind.label(),
            is_up: latest.map(|r| r.success),
            last_checked: latest.map(|r| r.timestamp),
            latency_ms: latest.map(CheckResult::latency_ms),
            last_error: latest.and_then(|r| r.error.clone()),
            uptime_percent,
        }
    }
}

#[derive(Serialize)]
struct CheckDot {
    success: bool,
    title: String,
}

#[derive(Serialize)]
struct MonitorView {
    name: String,
    kind: &'static str,
    status: &'static str,
    uptime_percent: Option<f64>,
    checks: Vec<CheckDot>,
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    let mut views = Vec::with_capacity(state.monitors.len());
    for target in state.monitors.iter() {
        let history = match state.store.history(&target.name, GRID_SIZE).await {
            Ok(history) => history,
            Err(e) => {
                error!(monitor = %target.name, error = %e, "Failed to fetch history.");
                continue;
            }
        };
        let summary = MonitorSummary::from_history(target, &history);
        views.push(MonitorView {
            name: target.name.clone(),
            kind: summary.kind,
            status: match summary.is_up {
                Some(true) => "up",
                Some(false) => "down",
                None => "pending",
            },
            uptime_percent: summary.uptime_percent,
            checks: history
                .iter()
                .map(|r| CheckDot {
                    success: r.success,
                    title: match &r.error {
                        Some(e) => format!("{} - {}", r.timestamp.format("%F %T UTC"), e),
                        None => format!("{} - {} ms", r.timestamp.format("%F %T UTC"), r.latency_ms()),
                    },
                })
                .collect(),
        });
    }

    let mut context = Context::new();
    context.insert("monitors", &views);
    context.insert("now", &Utc::now().format("%F %T UTC").to_string());
    Ok(Html(state.templates.render("index.html", &context)?))
}

async fn api_status(State(state): State<AppState>) -> Result<Json<Vec<MonitorSummary>>, WebError> {
    let mut summaries = Vec::with_capacity(state.monitors.len());
    for target in state.monitors.iter() {
        let history = state.store.history(&target.name, GRID_SIZE).await?;
        summaries.push(MonitorSummary::from_history(target, &history));
    }
    Ok(Json(summaries))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

async fn api_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CheckResult>>, WebError> {
    if !state.monitors.iter().any(|t| t.name == name) {
        return Err(WebError::NotFound(format!("unknown monitor '{name}'")));
    }
    let limit = query.limit.unwrap_or(GRID_SIZE).clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(state.store.history(&name, limit).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{ProbeKind, Store};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let now = Utc::now();
        for (i, success) in [true, true, false, true].into_iter().enumerate() {
            let at = now - chrono::Duration::seconds(40 - i as i64 * 10);
            let result = if success {
                CheckResult::up("api", at, Duration::from_millis(30))
            } else {
                CheckResult::down("api", at, Duration::from_millis(5), "status code 503, expected 200")
            };
            store.log_check(&result).await.unwrap();
        }
        let monitors = vec![
            Target::new("api", ProbeKind::http("http://api/health")),
            Target::new("db", ProbeKind::Tcp { host: "db".into(), port: 5432 }),
        ];
        router(AppState::new(store, monitors).unwrap())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body)
    }

    #[tokio::test]
    async fn test_status_api_summarises_history() {
        let (status, body) = get(app().await, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json[0]["name"], "api");
        assert_eq!(json[0]["is_up"], true);
        assert_eq!(json[0]["uptime_percent"], 75.0);
        assert_eq!(json[0]["latency_ms"], 30);
        assert_eq!(json[1]["name"], "db");
        assert!(json[1]["is_up"].is_null());
    }

    #[tokio::test]
    async fn test_history_api_limits_and_orders() {
        let (status, body) = get(app().await, "/api/monitors/api/history?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["success"], false);
        assert_eq!(entries[0]["error"], "status code 503, expected 200");
        assert_eq!(entries[1]["success"], true);

        let (status, _) = get(app().await, "/api/monitors/nope/history").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_renders_grid() {
        let (status, body) = get(app().await, "/").await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("api"));
        assert_eq!(html.matches("class=\"dot up\"").count(), 3);
        assert_eq!(html.matches("class=\"dot down\"").count(), 1);
        assert!(html.contains("PENDING"));
    }
}
