use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use string_analyzer_api::{
    ApiError, CreateStringRequest, StringAnalyzerApi, API_CONTRACT_VERSION,
};
use string_analyzer_core::FilterSet;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: StringAnalyzerApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct NaturalLanguageParams {
    query: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "string-analyzer-service")]
#[command(about = "Local HTTP service for the string analyzer")]
struct Args {
    #[arg(long, default_value = "./string_analyzer.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        let status = match err {
            ApiError::EmptyValue | ApiError::QueryNotUnderstood => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: err.to_string(),
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/db/schema-version", post(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .route("/v1/strings", post(strings_create).get(strings_list))
        .route("/v1/strings/filter-by-natural-language", get(strings_filter_by_natural_language))
        .route("/v1/strings/:value", get(strings_show).delete(strings_delete))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let state = ServiceState { api: StringAnalyzerApi::new(args.db) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn db_schema_version(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<string_analyzer_store_sqlite::SchemaStatus>>, ServiceError> {
    let status = state.api.schema_status()?;
    Ok(Json(envelope(status)))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<ServiceEnvelope<string_analyzer_api::MigrateResult>>, ServiceError> {
    let result = state.api.migrate(request.dry_run)?;
    Ok(Json(envelope(result)))
}

async fn strings_create(
    State(state): State<ServiceState>,
    Json(request): Json<CreateStringRequest>,
) -> Result<Response, ServiceError> {
    let record = state.api.create_string(request)?;
    Ok((StatusCode::CREATED, Json(envelope(record))).into_response())
}

async fn strings_list(
    State(state): State<ServiceState>,
    Query(filters): Query<FilterSet>,
) -> Result<Json<ServiceEnvelope<string_analyzer_api::FilteredStrings>>, ServiceError> {
    let listed = state.api.list_strings(filters)?;
    Ok(Json(envelope(listed)))
}

async fn strings_filter_by_natural_language(
    State(state): State<ServiceState>,
    Query(params): Query<NaturalLanguageParams>,
) -> Result<Json<ServiceEnvelope<string_analyzer_api::NlFilteredStrings>>, ServiceError> {
    let filtered = state.api.filter_by_natural_language(&params.query)?;
    Ok(Json(envelope(filtered)))
}

async fn strings_show(
    State(state): State<ServiceState>,
    Path(value): Path<String>,
) -> Result<Json<ServiceEnvelope<string_analyzer_core::StringRecord>>, ServiceError> {
    let record = state.api.get_string(&value)?;
    Ok(Json(envelope(record)))
}

async fn strings_delete(
    State(state): State<ServiceState>,
    Path(value): Path<String>,
) -> Result<Response, ServiceError> {
    state.api.delete_string(&value)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
