//! HTTP server for the WrapCRM API.
//!
//! Exposes the on-demand sweep triggers and a small read surface over the
//! order store. Both sweep endpoints run exactly the same sweep as the
//! scheduler; they differ only in how the report is presented.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
	routing::{get, post},
	Router,
};
use crm_config::ApiConfig;
use crm_core::Crm;
use crm_storage::StorageError;
use crm_types::SweepReport;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the assembled CRM for processing requests.
	pub crm: Arc<Crm>,
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	crm: Arc<Crm>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app_state = AppState { crm };

	let app = Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/sweeps", post(handle_run_sweep))
				.route("/sweeps/diagnostic", get(handle_diagnostic_sweep))
				.route("/orders/{id}", get(handle_get_order_by_id)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(app_state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("WrapCRM API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles POST /api/sweeps requests.
///
/// Runs a delivery sweep immediately and returns its report as JSON.
async fn handle_run_sweep(
	State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
	match state.crm.sweeper().run_sweep().await {
		Ok(report) => Ok(Json(json!({
			"success": true,
			"message": sweep_summary(&report),
			"checked": report.checked,
			"updated": report.updated,
			"errors": report.errors,
		}))),
		Err(e) => {
			tracing::error!(error = %e, "On-demand sweep failed");
			Err((
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(json!({ "success": false, "message": e.to_string() })),
			))
		},
	}
}

/// Handles GET /api/sweeps/diagnostic requests.
///
/// Runs a fresh sweep and narrates the result as plain text, the surface an
/// operator reads when they do not trust the numbers.
async fn handle_diagnostic_sweep(
	State(state): State<AppState>,
) -> Result<String, (StatusCode, String)> {
	match state.crm.sweeper().run_sweep().await {
		Ok(report) => Ok(narrate_report(&report)),
		Err(e) => {
			tracing::error!(error = %e, "Diagnostic sweep failed");
			Err((
				StatusCode::INTERNAL_SERVER_ERROR,
				format!("Sweep failed before any order was checked: {}\n", e),
			))
		},
	}
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order_by_id(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
	match state.crm.store().get_order(&id).await {
		Ok(order) => Ok(Json(json!(order))),
		Err(StorageError::NotFound) => Err((
			StatusCode::NOT_FOUND,
			Json(json!({ "error": format!("Order not found: {}", id) })),
		)),
		Err(e) => {
			tracing::error!(order_id = %id, error = %e, "Failed to load order");
			Err((
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(json!({ "error": e.to_string() })),
			))
		},
	}
}

fn sweep_summary(report: &SweepReport) -> String {
	format!(
		"Checked {} orders, updated {}, {} errors",
		report.checked,
		report.updated,
		report.errors.len()
	)
}

/// Renders a sweep report as human-readable text.
fn narrate_report(report: &SweepReport) -> String {
	let mut out = String::new();
	out.push_str("Delivery sweep diagnostic\n");
	out.push_str("=========================\n");
	out.push_str(&format!("Orders checked:  {}\n", report.checked));
	out.push_str(&format!("Orders updated:  {}\n", report.updated));
	out.push_str(&format!("Errors:          {}\n", report.errors.len()));
	out.push_str(&format!("Elapsed:         {} ms\n", report.elapsed_ms));

	if report.budget_exhausted {
		out.push_str("\nNote: the sweep stopped early because its time budget ran out.\n");
		out.push_str("Remaining orders will be picked up by the next sweep.\n");
	}

	if report.errors.is_empty() {
		out.push_str("\nNo per-order failures.\n");
	} else {
		out.push_str("\nPer-order failures (these orders were left unchanged):\n");
		for error in &report.errors {
			out.push_str(&format!(
				"  - {} ({}): {}\n",
				error.order_number, error.order_id, error.message
			));
		}
	}

	out
}
