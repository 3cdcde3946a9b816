// Income ETL - Web Server
// REST API over the persisted income records, metrics recomputed per request

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use income_etl::logging::init_logging;
use income_etl::{
    get_all_records, get_records_by_category, get_records_by_year_range, get_runs, open_database,
    Category, Cleaner, GenderGap, IncomeRecord, MetricSet, MetricsEngine, PipelineConfig,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "income-server")]
#[command(about = "Serve persisted income records and metrics over HTTP")]
#[command(version)]
struct Cli {
    /// SQLite database written by income-etl
    #[arg(long)]
    database: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    threshold: f64,
    exclude_outliers: bool,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        let body = Self {
            success: true,
            data: Some(data),
            error: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }

    fn err(status: StatusCode, message: impl Into<String>) -> Response {
        let body = Self {
            success: false,
            data: None,
            error: Some(message.into()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct YearRangeQuery {
    from: Option<i32>,
    to: Option<i32>,
}

/// Gap row flattened with its region
#[derive(Serialize)]
struct GapResponse {
    region_code: String,
    region_name: String,
    #[serde(flatten)]
    gap: GenderGap,
}

impl AppState {
    /// Lock the connection and run a query; errors become 500 responses
    fn query<T, F>(&self, f: F) -> std::result::Result<T, Response>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.db.lock().map_err(|_| {
            ApiResponse::<()>::err(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned")
        })?;

        f(&conn).map_err(|e| {
            error!(error = %e, "Query failed");
            ApiResponse::<()>::err(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        })
    }

    /// Same cleaning and metric rules as the batch pipeline
    fn compute_metrics(&self, records: &[IncomeRecord]) -> std::result::Result<Vec<MetricSet>, Response> {
        let cleaned = Cleaner::new(self.threshold).clean(records);
        MetricsEngine::new(self.exclude_outliers)
            .compute_all(&cleaned)
            .map_err(|e| ApiResponse::<()>::err(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/records?from=&to= - All records, optionally within a year range
async fn list_records(State(state): State<AppState>, Query(range): Query<YearRangeQuery>) -> Response {
    let result = state.query(|conn| match (range.from, range.to) {
        (None, None) => get_all_records(conn),
        (from, to) => get_records_by_year_range(conn, from.unwrap_or(i32::MIN), to.unwrap_or(i32::MAX)),
    });

    match result {
        Ok(records) => ApiResponse::ok(records),
        Err(response) => response,
    }
}

/// GET /api/records/:category - Records of one category (ALL, M, Mujeres, ...)
async fn category_records(State(state): State<AppState>, Path(category): Path<String>) -> Response {
    let Some(category) = Category::parse(&category) else {
        return ApiResponse::<()>::err(
            StatusCode::BAD_REQUEST,
            format!("Unknown category: {}", category),
        );
    };

    match state.query(|conn| get_records_by_category(conn, category)) {
        Ok(records) => ApiResponse::ok(records),
        Err(response) => response,
    }
}

/// GET /api/metrics - Metrics per region
async fn metrics(State(state): State<AppState>) -> Response {
    let result = state
        .query(get_all_records)
        .and_then(|records| state.compute_metrics(&records));

    match result {
        Ok(sets) => ApiResponse::ok(sets),
        Err(response) => response,
    }
}

/// GET /api/gaps - Gender gap per region and year
async fn gaps(State(state): State<AppState>) -> Response {
    let result = state
        .query(get_all_records)
        .and_then(|records| state.compute_metrics(&records));

    match result {
        Ok(sets) => {
            let gaps: Vec<GapResponse> = sets
                .into_iter()
                .flat_map(|set| {
                    let (code, name) = (set.region_code, set.region_name);
                    set.gender_gaps.into_iter().map(move |gap| GapResponse {
                        region_code: code.clone(),
                        region_name: name.clone(),
                        gap,
                    })
                })
                .collect();
            ApiResponse::ok(gaps)
        }
        Err(response) => response,
    }
}

/// GET /api/runs - Pipeline run audit trail, newest first
async fn runs(State(state): State<AppState>) -> Response {
    match state.query(get_runs) {
        Ok(runs) => ApiResponse::ok(runs),
        Err(response) => response,
    }
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    let _guard = init_logging(&config.log_level, &config.log_dir, false)?;

    let db_path = cli
        .database
        .or_else(|| config.database_path.clone())
        .context("No database configured (use --database or INCOME_ETL_DATABASE_PATH)")?;

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run income-etl on a source file first.",
            db_path.display()
        );
    }

    let conn = open_database(&db_path)?;
    info!(db = %db_path.display(), "Database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        threshold: config.outlier_threshold,
        exclude_outliers: config.exclude_outliers,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records", get(list_records))
        .route("/records/:category", get(category_records))
        .route("/metrics", get(metrics))
        .route("/gaps", get(gaps))
        .route("/runs", get(runs))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cli.addr))?;

    info!(addr = %cli.addr, "Server running");
    println!("\n🚀 Server running on http://{}", cli.addr);
    println!("   API: http://{}/api/metrics", cli.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
