// Nexus Equity - REST API with Axum
// Router lives in the library so it can be exercised with tower::ServiceExt

use crate::accreditation::{
    annual_investment_limit, calculate_net_worth, determine_accreditation, validate_income_history,
    AccreditationCriteria, AccreditationResult, IncomeHistoryCheck, InvestmentLimit,
};
use crate::cap_table::{CapTableReconciler, CapTableReport};
use crate::db::{
    find_recorded_scenario_id, get_scenarios, list_cap_tables, load_cap_table, record_scenario,
    save_cap_table, CapTableSummary, Scenario,
};
use crate::dilution::{
    calculate_dilution, calculate_ownership_with_new_investors, requires_special_warning,
    DilutionImpact, NewInvestment, Stakeholder, StakeholderDilution,
};
use crate::severity::SeverityBadge;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = %e, "request failed");
        Self::internal(&e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Serialize)]
pub struct AccreditationResponse {
    #[serde(flatten)]
    result: AccreditationResult,
    investment_limit: InvestmentLimit,
}

#[derive(Deserialize)]
pub struct NetWorthRequest {
    total_assets: f64,
    total_liabilities: f64,
    #[serde(default)]
    primary_residence_value: f64,
    #[serde(default)]
    primary_residence_mortgage: f64,
}

#[derive(Serialize)]
pub struct NetWorthResponse {
    net_worth: f64,
}

#[derive(Deserialize)]
pub struct IncomeHistoryRequest {
    income_by_year: BTreeMap<i32, f64>,
}

#[derive(Deserialize)]
pub struct DilutionRequest {
    cap_table: Vec<Stakeholder>,
    new_shares: u64,
    #[serde(default)]
    valuation_pre: Option<f64>,
    #[serde(default)]
    valuation_post: Option<f64>,
    #[serde(default)]
    founders: Vec<String>,
}

#[derive(Deserialize)]
pub struct NewInvestorsRequest {
    cap_table: Vec<Stakeholder>,
    new_investments: Vec<NewInvestment>,
    #[serde(default)]
    founders: Vec<String>,
}

#[derive(Deserialize)]
pub struct ScenarioRequest {
    new_shares: u64,
    #[serde(default)]
    valuation_pre: Option<f64>,
    #[serde(default)]
    valuation_post: Option<f64>,
    #[serde(default)]
    founders: Vec<String>,
}

/// Dilution row with its UI treatment
#[derive(Serialize)]
pub struct DilutionRow {
    #[serde(flatten)]
    row: StakeholderDilution,
    severity: SeverityBadge,
    requires_warning: bool,
}

#[derive(Serialize)]
pub struct DilutionResponse {
    stakeholders: Vec<DilutionRow>,
    total_shares_before: u64,
    total_shares_after: u64,
    new_shares_issued: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recorded: Option<bool>,
}

impl DilutionResponse {
    fn from_impact(impact: DilutionImpact, founders: &[String]) -> Self {
        let founders: HashSet<&str> = founders.iter().map(String::as_str).collect();

        let stakeholders = impact
            .stakeholders
            .into_iter()
            .map(|row| {
                let is_founder = founders.contains(row.stakeholder.id.as_str());
                DilutionRow {
                    severity: row.severity().into(),
                    requires_warning: requires_special_warning(&row, is_founder),
                    row,
                }
            })
            .collect();

        Self {
            stakeholders,
            total_shares_before: impact.total_shares_before,
            total_shares_after: impact.total_shares_after,
            new_shares_issued: impact.new_shares_issued,
            scenario_id: None,
            recorded: None,
        }
    }
}

#[derive(Serialize)]
pub struct CapTableResponse {
    name: String,
    stakeholders: Vec<Stakeholder>,
    reconciliation: CapTableReport,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/accreditation
async fn accreditation(Json(criteria): Json<AccreditationCriteria>) -> ApiResult<AccreditationResponse> {
    let result = determine_accreditation(&criteria);
    let investment_limit = annual_investment_limit(&criteria, result.status);

    Ok(Json(ApiResponse::ok(AccreditationResponse {
        result,
        investment_limit,
    })))
}

/// POST /api/accreditation/net-worth
async fn net_worth(Json(req): Json<NetWorthRequest>) -> ApiResult<NetWorthResponse> {
    let net_worth = calculate_net_worth(
        req.total_assets,
        req.total_liabilities,
        req.primary_residence_value,
        req.primary_residence_mortgage,
    );
    Ok(Json(ApiResponse::ok(NetWorthResponse { net_worth })))
}

/// POST /api/accreditation/income-history
async fn income_history(Json(req): Json<IncomeHistoryRequest>) -> ApiResult<IncomeHistoryCheck> {
    Ok(Json(ApiResponse::ok(validate_income_history(&req.income_by_year))))
}

/// POST /api/dilution - Dilution over an inline cap table
async fn dilution(Json(req): Json<DilutionRequest>) -> ApiResult<DilutionResponse> {
    let impact = calculate_dilution(
        &req.cap_table,
        req.new_shares,
        req.valuation_pre,
        req.valuation_post,
    );
    Ok(Json(ApiResponse::ok(DilutionResponse::from_impact(impact, &req.founders))))
}

/// POST /api/dilution/new-investors
async fn dilution_new_investors(Json(req): Json<NewInvestorsRequest>) -> ApiResult<DilutionResponse> {
    let impact = calculate_ownership_with_new_investors(&req.cap_table, &req.new_investments);
    Ok(Json(ApiResponse::ok(DilutionResponse::from_impact(impact, &req.founders))))
}

/// GET /api/cap-tables
async fn cap_tables(State(state): State<AppState>) -> ApiResult<Vec<CapTableSummary>> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(list_cap_tables(&conn)?)))
}

fn load_existing(conn: &Connection, name: &str) -> Result<Vec<Stakeholder>, ApiError> {
    let stakeholders = load_cap_table(conn, name)?;
    if stakeholders.is_empty() {
        return Err(ApiError::not_found(format!("Cap table not found: {}", name)));
    }
    Ok(stakeholders)
}

/// GET /api/cap-tables/:name
async fn get_cap_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CapTableResponse> {
    let conn = state.conn()?;
    let stakeholders = load_existing(&conn, &name)?;
    let reconciliation = CapTableReconciler::new().reconcile(&stakeholders);

    Ok(Json(ApiResponse::ok(CapTableResponse {
        name,
        stakeholders,
        reconciliation,
    })))
}

/// PUT /api/cap-tables/:name - Replace a cap table
async fn put_cap_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(stakeholders): Json<Vec<Stakeholder>>,
) -> ApiResult<CapTableResponse> {
    let conn = state.conn()?;
    save_cap_table(&conn, &name, &stakeholders)?;
    let reconciliation = CapTableReconciler::new().reconcile(&stakeholders);

    Ok(Json(ApiResponse::ok(CapTableResponse {
        name,
        stakeholders,
        reconciliation,
    })))
}

/// POST /api/cap-tables/:name/scenarios - Compute and record
async fn create_scenario(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ScenarioRequest>,
) -> ApiResult<DilutionResponse> {
    let conn = state.conn()?;
    let stakeholders = load_existing(&conn, &name)?;

    let impact = calculate_dilution(
        &stakeholders,
        req.new_shares,
        req.valuation_pre,
        req.valuation_post,
    );
    let scenario = Scenario::new(
        &name,
        req.new_shares,
        req.valuation_pre,
        req.valuation_post,
        impact.clone(),
    );
    let recorded = record_scenario(&conn, &scenario)?;
    // Duplicates point at the row already stored
    let scenario_id = if recorded {
        Some(scenario.id)
    } else {
        find_recorded_scenario_id(&conn, &scenario)?
    };

    let mut response = DilutionResponse::from_impact(impact, &req.founders);
    response.scenario_id = scenario_id;
    response.recorded = Some(recorded);

    Ok(Json(ApiResponse::ok(response)))
}

/// GET /api/cap-tables/:name/scenarios
async fn list_scenarios(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<Scenario>> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(get_scenarios(&conn, &name)?)))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/accreditation", post(accreditation))
        .route("/accreditation/net-worth", post(net_worth))
        .route("/accreditation/income-history", post(income_history))
        .route("/dilution", post(dilution))
        .route("/dilution/new-investors", post(dilution_new_investors))
        .route("/cap-tables", get(cap_tables))
        .route("/cap-tables/:name", get(get_cap_table).put(put_cap_table))
        .route(
            "/cap-tables/:name/scenarios",
            get(list_scenarios).post(create_scenario),
        )
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        router(AppState::new(conn))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(b) => builder.body(Body::from(b.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn cap_table_json() -> Value {
        json!([
            {"id": "a", "name": "Alice", "current_shares": 600, "current_ownership": 60.0},
            {"id": "b", "name": "Bob", "current_shares": 400, "current_ownership": 40.0}
        ])
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_accreditation_endpoint() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/accreditation",
            Some(json!({"investor_type": "individual", "annual_income": 150000})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "non_accredited");
        assert_eq!(body["data"]["meets_requirements"], false);
        assert_eq!(body["data"]["investment_limit"]["kind"], "capped");
    }

    #[tokio::test]
    async fn test_net_worth_endpoint() {
        let (_, body) = send(
            app(),
            "POST",
            "/api/accreditation/net-worth",
            Some(json!({
                "total_assets": 1000000.0,
                "total_liabilities": 200000.0,
                "primary_residence_value": 300000.0,
                "primary_residence_mortgage": 250000.0
            })),
        )
        .await;

        assert_eq!(body["data"]["net_worth"], 750000.0);
    }

    #[tokio::test]
    async fn test_dilution_endpoint_flags_founder() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/dilution",
            Some(json!({
                "cap_table": cap_table_json(),
                "new_shares": 1000,
                "founders": ["a"]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let rows = body["data"]["stakeholders"].as_array().unwrap();
        assert_eq!(rows[0]["new_ownership"], 30.0);
        assert_eq!(rows[0]["severity"]["level"], "severe");
        assert_eq!(rows[0]["requires_warning"], true);
        assert_eq!(body["data"]["total_shares_after"], 2000);
    }

    #[tokio::test]
    async fn test_unknown_cap_table_is_404() {
        let (status, body) = send(app(), "GET", "/api/cap-tables/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_save_then_record_scenario() {
        let app = app();

        let (status, body) =
            send(app.clone(), "PUT", "/api/cap-tables/series-a", Some(cap_table_json())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reconciliation"]["result"]["Balanced"]["total_ownership"], 100.0);

        let request = json!({"new_shares": 500, "valuation_pre": 1000000.0, "valuation_post": 1500000.0});
        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/cap-tables/series-a/scenarios",
            Some(request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["recorded"], true);
        let first_id = body["data"]["scenario_id"].clone();
        assert!(first_id.is_string());

        let (_, body) =
            send(app.clone(), "POST", "/api/cap-tables/series-a/scenarios", Some(request)).await;
        assert_eq!(body["data"]["recorded"], false);
        assert_eq!(body["data"]["scenario_id"], first_id);

        let (_, body) = send(app, "GET", "/api/cap-tables/series-a/scenarios", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["id"], first_id);
    }

    #[tokio::test]
    async fn test_cap_table_name_is_decoded_once() {
        let app = app();

        // Path "a%2541" names the table "a%41"
        let (status, body) =
            send(app.clone(), "PUT", "/api/cap-tables/a%2541", Some(cap_table_json())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "a%41");

        let (status, _) = send(app.clone(), "GET", "/api/cap-tables/a%2541", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(app, "GET", "/api/cap-tables/aA", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (status, _) = send(app(), "POST", "/api/dilution", Some(json!({"new_shares": -1}))).await;
        assert!(status.is_client_error());
    }
}
