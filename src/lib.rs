pub mod auth;
pub mod chart;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod metrics;
pub mod querier;
pub mod workbook;
pub mod writer;

use auth::{IdentityVerifier, User};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chart::ChartRenderer;
use config::AppConfig;
use error::ApiError;
use querier::IssueQuerier;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use workbook::{BookPayload, JsonBook, Workbook};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Service for fetching and aggregating repository issues.
    pub querier: IssueQuerier,
    /// Resolves caller tokens into identities.
    pub verifier: IdentityVerifier,
    /// Draws the dashboard chart.
    pub renderer: ChartRenderer,
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
}

impl AppState {
    /// Initializes the application state, including the GitHub and identity clients.
    ///
    /// Fails if the chart font cannot be loaded.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let renderer = ChartRenderer::with_font(&config.chart_font_path)?;
        Self::with_renderer(config, renderer)
    }

    /// Initializes the application state with an already configured chart renderer.
    pub fn with_renderer(config: AppConfig, renderer: ChartRenderer) -> anyhow::Result<Self> {
        let querier = IssueQuerier::new(&config)?;
        let verifier = IdentityVerifier::new(&config)?;
        Ok(Self {
            querier,
            verifier,
            renderer,
            config,
        })
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/github/issues", post(analyze_issues))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "issue-dashboard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Refreshes the dashboard of the posted workbook for the repository named in it.
///
/// The response carries the workbook actions for the add-in to apply. Nothing is returned,
/// and so nothing reaches the document, unless every step succeeded.
pub async fn analyze_issues(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(payload): Json<BookPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    tracing::info!("Running query for {}", user.email);

    let mut book = JsonBook::new(payload);
    let repo_id = writer::read_repository(&book)?;

    let report = state.querier.get(&repo_id).await?;
    tracing::debug!(repo_id = %repo_id, months = report.cumulative.len(), "Aggregated issues");

    let chart = state.renderer.render(&report.cumulative, writer::CHART_NAME)?;
    writer::write_report(&mut book, &report, &chart)?;

    Ok(Json(book.serialize()?))
}
