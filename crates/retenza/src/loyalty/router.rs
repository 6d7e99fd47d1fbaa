use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    BusinessId, BusinessRegistration, CustomerId, CustomerSignup, MissionDraft, MissionId,
    NotificationRequest, ProgramDefinition, RegistryId, RegistryStatus, ReviewDecision,
    TransactionRequest,
};
use super::import::{TransactionImportError, TransactionImporter};
use super::repository::{
    LoyaltyRepository, MissionRepository, NotificationPublisher, RepositoryError,
};
use super::service::{LoyaltyService, LoyaltyServiceError};

type SharedService<R, M, N> = Arc<LoyaltyService<R, M, N>>;

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) decision: ReviewDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollmentRequest {
    pub(crate) customer_id: CustomerId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportRequest {
    pub(crate) csv: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistryStatusRequest {
    pub(crate) status: RegistryStatus,
}

/// Router builder exposing the business and customer endpoints.
pub fn loyalty_router<R, M, N>(service: SharedService<R, M, N>) -> Router
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/businesses", post(register_business_handler::<R, M, N>))
        .route(
            "/api/v1/businesses/:business_id/review",
            post(review_business_handler::<R, M, N>),
        )
        .route(
            "/api/v1/businesses/:business_id/program",
            get(program_handler::<R, M, N>).put(configure_program_handler::<R, M, N>),
        )
        .route(
            "/api/v1/businesses/:business_id/enrollments",
            post(enroll_handler::<R, M, N>),
        )
        .route(
            "/api/v1/businesses/:business_id/transactions",
            post(record_transaction_handler::<R, M, N>),
        )
        .route(
            "/api/v1/businesses/:business_id/transactions/import",
            post(import_transactions_handler::<R, M, N>),
        )
        .route(
            "/api/v1/businesses/:business_id/missions",
            post(create_mission_handler::<R, M, N>),
        )
        .route(
            "/api/v1/businesses/:business_id/notifications",
            post(notify_handler::<R, M, N>),
        )
        .route("/api/v1/customers", post(register_customer_handler::<R, M, N>))
        .route(
            "/api/v1/customers/:customer_id/loyalty",
            get(customer_overview_handler::<R, M, N>),
        )
        .route(
            "/api/v1/customers/:customer_id/transactions",
            get(customer_transactions_handler::<R, M, N>),
        )
        .route(
            "/api/v1/customers/:customer_id/missions",
            get(eligible_missions_handler::<R, M, N>),
        )
        .route(
            "/api/v1/customers/:customer_id/missions/:mission_id",
            post(opt_in_handler::<R, M, N>),
        )
        .route(
            "/api/v1/registries/:registry_id/status",
            post(registry_status_handler::<R, M, N>),
        )
        .with_state(service)
}

pub(crate) async fn register_business_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Json(registration): Json<BusinessRegistration>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.register_business(registration, Utc::now()) {
        Ok(account) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn review_business_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.review_business(&BusinessId(business_id), request.decision) {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn program_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.program(&BusinessId(business_id)) {
        Ok(program) => (StatusCode::OK, Json(program)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn configure_program_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(definition): Json<ProgramDefinition>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.configure_program(&BusinessId(business_id), definition) {
        Ok(update) => (StatusCode::OK, Json(update)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn enroll_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(request): Json<EnrollmentRequest>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.enroll_customer(&BusinessId(business_id), &request.customer_id, Utc::now()) {
        Ok(loyalty) => (StatusCode::CREATED, Json(loyalty)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn record_transaction_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(request): Json<TransactionRequest>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.record_transaction(&BusinessId(business_id), request, Utc::now()) {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn import_transactions_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(request): Json<ImportRequest>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let reader = Cursor::new(request.csv.into_bytes());
    let business_id = BusinessId(business_id);
    match TransactionImporter::from_reader(reader, service.as_ref(), &business_id, Utc::now()) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(TransactionImportError::Service(err)) => service_error_response(err),
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn create_mission_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(draft): Json<MissionDraft>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.create_mission(&BusinessId(business_id), draft, Utc::now()) {
        Ok(mission) => (StatusCode::CREATED, Json(mission)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn notify_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(business_id): Path<String>,
    Json(request): Json<NotificationRequest>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.notify_customers(&BusinessId(business_id), request) {
        Ok(receipt) => (StatusCode::ACCEPTED, Json(receipt)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn register_customer_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Json(signup): Json<CustomerSignup>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.register_customer(signup) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn customer_overview_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.customer_overview(&CustomerId(customer_id)) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn customer_transactions_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.customer_transactions(&CustomerId(customer_id)) {
        Ok(transactions) => (StatusCode::OK, Json(transactions)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn eligible_missions_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.eligible_missions(&CustomerId(customer_id), Utc::now()) {
        Ok(missions) => (StatusCode::OK, Json(missions)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn opt_in_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path((customer_id, mission_id)): Path<(String, String)>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let customer_id = CustomerId(customer_id);
    let mission_id = MissionId(mission_id);
    match service.opt_into_mission(&customer_id, &mission_id, Utc::now()) {
        Ok(registry) => (StatusCode::CREATED, Json(registry)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn registry_status_handler<R, M, N>(
    State(service): State<SharedService<R, M, N>>,
    Path(registry_id): Path<String>,
    Json(request): Json<RegistryStatusRequest>,
) -> Response
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.update_registry_status(&RegistryId(registry_id), request.status, Utc::now()) {
        Ok(registry) => (StatusCode::OK, Json(registry)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) fn service_error_response(error: LoyaltyServiceError) -> Response {
    let status = service_error_status(&error);
    let payload = json!({
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}

pub(crate) fn service_error_status(error: &LoyaltyServiceError) -> StatusCode {
    match error {
        LoyaltyServiceError::Tier(_)
        | LoyaltyServiceError::Points(_)
        | LoyaltyServiceError::Invalid(_)
        | LoyaltyServiceError::MissionUnavailable(_)
        | LoyaltyServiceError::InvalidRegistryTransition { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LoyaltyServiceError::BusinessNotFound(_)
        | LoyaltyServiceError::ProgramNotConfigured(_)
        | LoyaltyServiceError::MissionNotFound(_)
        | LoyaltyServiceError::RegistryNotFound(_)
        | LoyaltyServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LoyaltyServiceError::AlreadyEnrolled { .. }
        | LoyaltyServiceError::MissionAlreadyCompleted(_)
        | LoyaltyServiceError::MissionAlreadyInProgress(_)
        | LoyaltyServiceError::Repository(RepositoryError::Conflict)
        | LoyaltyServiceError::Repository(RepositoryError::StaleWrite) => StatusCode::CONFLICT,
        LoyaltyServiceError::BusinessNotApproved { .. } => StatusCode::FORBIDDEN,
        LoyaltyServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
