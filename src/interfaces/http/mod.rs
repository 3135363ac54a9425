pub mod rate_limit;

use crate::application::authorization::{AuthorizationEngine, NewPolicy};
use crate::application::sessions::SessionManager;
use crate::application::settlement::SettlementCoordinator;
use crate::config::Config;
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::money::Amount;
use crate::domain::policy::{ActorKind, PolicyPatch};
use crate::domain::ports::{InvoiceStoreHandle, Page};
use crate::domain::session::{ExecutionMode, PaymentSession, ProofReference};
use crate::error::PaymentError;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use rate_limit::RateLimiter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Everything the handlers need, constructed once in `main` and injected.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub engine: Arc<AuthorizationEngine>,
    pub coordinator: Arc<SettlementCoordinator>,
    pub invoices: InvoiceStoreHandle,
    pub rate_limiter: Arc<RateLimiter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invoices/{id}/pay", post(open_payment))
        .route("/invoices/{id}/pay/confirm", post(confirm_payment))
        .route("/payment-authorization", post(create_policy))
        .route("/payment-authorization/{id}", get(get_policy).patch(patch_policy))
        .route("/payment-authorization/{id}/revoke", post(revoke_policy))
        .route("/payment-authorization/{id}/executions", get(list_executions))
        .route("/payment-authorization/{id}/audit", get(list_audit))
        .with_state(state)
}

/// `PaymentError` → one HTTP status each, with a stable code and a fresh
/// correlation id in the body.
struct ApiError(PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PaymentError::ProtocolDisabled => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::InvoiceNotFound(_)
            | PaymentError::PolicyNotFound(_)
            | PaymentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::NotPayable(_)
            | PaymentError::WrongInvoice
            | PaymentError::InvalidProofFormat
            | PaymentError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            PaymentError::SessionExpired(_) => StatusCode::GONE,
            PaymentError::SessionAlreadyConfirmed(_) | PaymentError::DuplicateProof => {
                StatusCode::CONFLICT
            }
            PaymentError::VerificationFailed(_)
            | PaymentError::AmountMismatch
            | PaymentError::RecipientMismatch
            | PaymentError::CurrencyMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            PaymentError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            PaymentError::ExecutionFailed(_) | PaymentError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
            "correlationId": crate::domain::session::generate_token(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentTerms {
    amount: Amount,
    currency: String,
    chain: String,
    recipient: String,
    reference: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayResponse {
    session_id: String,
    expires_at: DateTime<Utc>,
    payment: PaymentTerms,
    invoice: Invoice,
}

async fn open_payment(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> ApiResult<Response> {
    state.rate_limiter.check(&invoice_id)?;

    let invoice = state
        .invoices
        .get(&invoice_id)
        .await?
        .ok_or_else(|| PaymentError::InvoiceNotFound(invoice_id.clone()))?;

    if !state.config.protocol_enabled {
        let body = serde_json::json!({
            "message": "payment protocol is disabled",
            "invoice": invoice,
        });
        return Ok((StatusCode::OK, Json(body)).into_response());
    }
    if invoice.status == InvoiceStatus::Paid || invoice.remaining().is_zero() {
        let body = serde_json::json!({
            "message": "invoice is already paid",
            "invoice": invoice,
        });
        return Ok((StatusCode::OK, Json(body)).into_response());
    }
    // Invoices awaiting approval cannot be offered for payment.
    if invoice.status == InvoiceStatus::Pending {
        return Err(PaymentError::NotPayable(invoice_id).into());
    }

    let session = state
        .sessions
        .open(
            &invoice,
            ExecutionMode::UserInitiated,
            None,
            serde_json::Value::Null,
        )
        .await?;
    let body = PayResponse {
        session_id: session.id.clone(),
        expires_at: session.expires_at,
        payment: PaymentTerms {
            amount: session.amount_requested,
            currency: session.currency.clone(),
            chain: session.chain.clone(),
            recipient: session.recipient.clone(),
            reference: session.id,
        },
        invoice,
    };
    Ok((StatusCode::PAYMENT_REQUIRED, Json(body)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest {
    session_id: String,
    tx_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    session: PaymentSession,
    repeated: bool,
    invoice: Option<Invoice>,
}

async fn confirm_payment(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Json<ConfirmResponse>> {
    if !state.config.protocol_enabled {
        return Err(PaymentError::ProtocolDisabled.into());
    }
    let proof = ProofReference::parse(&request.tx_hash)?;
    let session = state
        .sessions
        .get(&request.session_id)
        .await?
        .ok_or_else(|| PaymentError::SessionNotFound(request.session_id.clone()))?;
    if session.invoice_id != invoice_id {
        return Err(PaymentError::WrongInvoice.into());
    }

    let outcome = state.sessions.confirm(&request.session_id, proof.as_str()).await?;
    if outcome.newly_confirmed {
        state
            .coordinator
            .confirm_payment(
                &invoice_id,
                outcome.session.amount_requested,
                &outcome.session.currency,
                &proof,
                &outcome.session.id,
            )
            .await?;
    }

    let invoice = state.invoices.get(&invoice_id).await?;
    Ok(Json(ConfirmResponse {
        session: outcome.session,
        repeated: !outcome.newly_confirmed,
        invoice,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePolicyRequest {
    company_id: String,
    #[serde(default)]
    max_amount_per_invoice: Amount,
    #[serde(default)]
    daily_limit: Amount,
    #[serde(default)]
    monthly_limit: Amount,
    allowed_currencies: HashSet<String>,
    allowed_chains: HashSet<String>,
    allowed_invoice_statuses: HashSet<InvoiceStatus>,
    #[serde(default)]
    auto_approve: bool,
}

async fn create_policy(
    State(state): State<AppState>,
    Json(request): Json<CreatePolicyRequest>,
) -> ApiResult<Response> {
    let policy = state
        .engine
        .create_policy(
            NewPolicy {
                company_id: request.company_id,
                max_amount_per_invoice: request.max_amount_per_invoice,
                daily_limit: request.daily_limit,
                monthly_limit: request.monthly_limit,
                allowed_currencies: request.allowed_currencies,
                allowed_chains: request.allowed_chains,
                allowed_invoice_statuses: request.allowed_invoice_statuses,
                auto_approve: request.auto_approve,
            },
            ActorKind::Human,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(policy)).into_response())
}

async fn get_policy(
    State(state): State<AppState>,
    Path(policy_id): Path<String>,
) -> ApiResult<Response> {
    let policy = state
        .engine
        .get_policy(&policy_id)
        .await?
        .ok_or_else(|| PaymentError::PolicyNotFound(policy_id))?;
    Ok(Json(policy).into_response())
}

async fn patch_policy(
    State(state): State<AppState>,
    Path(policy_id): Path<String>,
    Json(patch): Json<PolicyPatch>,
) -> ApiResult<Response> {
    let policy = state
        .engine
        .patch_policy(&policy_id, patch, ActorKind::Human)
        .await?;
    Ok(Json(policy).into_response())
}

async fn revoke_policy(
    State(state): State<AppState>,
    Path(policy_id): Path<String>,
) -> ApiResult<Response> {
    let policy = state
        .engine
        .revoke_policy(&policy_id, ActorKind::Human)
        .await?;
    Ok(Json(policy).into_response())
}

#[derive(Deserialize, Default)]
struct PageParams {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

impl From<PageParams> for Page {
    fn from(params: PageParams) -> Self {
        match params.limit {
            Some(limit) => Page::new(params.offset, limit),
            None => Page {
                offset: params.offset,
                ..Page::default()
            },
        }
    }
}

async fn list_executions(
    State(state): State<AppState>,
    Path(policy_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Response> {
    // 404 for unknown policies rather than an empty page.
    state
        .engine
        .get_policy(&policy_id)
        .await?
        .ok_or_else(|| PaymentError::PolicyNotFound(policy_id.clone()))?;
    let records = state.engine.executions(&policy_id, params.into()).await?;
    Ok(Json(records).into_response())
}

async fn list_audit(
    State(state): State<AppState>,
    Path(policy_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Response> {
    state
        .engine
        .get_policy(&policy_id)
        .await?
        .ok_or_else(|| PaymentError::PolicyNotFound(policy_id.clone()))?;
    let entries = state.engine.audit_log(&policy_id, params.into()).await?;
    Ok(Json(entries).into_response())
}
