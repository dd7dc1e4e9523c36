//! Axum REST API handlers.

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::abi::FeralSoul;
use crate::chain::WalletStatus;
use crate::context::AppContext;
use crate::errors::ReleaseError;
use crate::i18n::{self, Language};
use crate::identifier::Identifier;
use crate::session::SessionHandle;
use crate::units::format_units;
use crate::wizard::{ExistenceCheck, Step, Submission, WizardError, WizardView};

#[derive(Clone)]
pub struct ApiState {
    pub ctx: Arc<AppContext>,
    pub session: SessionHandle,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LangQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierRequest {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub text: String,
}

#[derive(Default, Deserialize)]
pub struct ExportRequest {
    pub passphrase: Option<Zeroizing<String>>,
    #[serde(default)]
    pub plaintext: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct FundingResponse {
    pub target: String,
    pub balance: String,
    pub remaining: String,
    /// Percentage with one decimal, e.g. `"45.4"`.
    pub progress: String,
    pub funded: bool,
}

#[derive(Serialize)]
pub struct StepResponse {
    pub number: u8,
    pub label: &'static str,
}

#[derive(Serialize)]
pub struct WizardResponse {
    pub language: Language,
    pub step: StepResponse,
    pub steps: Vec<StepResponse>,
    pub required_chain_id: u64,
    pub wallet: Option<WalletStatus>,
    pub identifier_input: String,
    pub identifier: Option<Identifier>,
    pub existence: Option<ExistenceCheck>,
    pub bot_wallet: Option<Address>,
    pub funding: FundingResponse,
    pub confirmation_matches: bool,
    pub can_submit: bool,
    pub submission: Submission,
    pub explorer_url: Option<String>,
    pub notices: Vec<String>,
}

#[derive(Serialize)]
pub struct SoulResponse {
    pub memory_hash: B256,
    pub registered: bool,
    pub soul: Option<FeralSoul>,
}

impl WizardResponse {
    pub fn render(view: WizardView, ctx: &AppContext, lang: Language) -> Self {
        let decimals = ctx.config.token_decimals;
        let funding = &view.funding;
        let bps = funding.progress_bps();

        let steps = [
            Step::ConnectWallet,
            Step::SubmitIdentifier,
            Step::GenerateWallet,
            Step::FundWallet,
            Step::ConfirmRelease,
        ]
        .into_iter()
        .map(|step| StepResponse {
            number: step.number(),
            label: i18n::step_label(lang, step),
        })
        .collect();

        WizardResponse {
            language: lang,
            step: StepResponse {
                number: view.step_number,
                label: i18n::step_label(lang, view.step),
            },
            steps,
            required_chain_id: view.required_chain_id,
            wallet: view.wallet,
            identifier_input: view.identifier_input,
            identifier: view.identifier,
            existence: view.existence,
            bot_wallet: view.bot_wallet,
            funding: FundingResponse {
                target: format_units(funding.target(), decimals, 2),
                balance: format_units(funding.latest().unwrap_or_default(), decimals, 2),
                remaining: format_units(funding.remaining(), decimals, 2),
                progress: format!("{}.{}", bps / 100, (bps % 100) / 10),
                funded: funding.is_satisfied(),
            },
            confirmation_matches: view.confirmation_matches,
            can_submit: view.can_submit,
            explorer_url: view
                .submission
                .tx_hash()
                .map(|tx| ctx.config.explorer_tx_url(&tx.to_string())),
            submission: view.submission,
            notices: view.notices.iter().map(|n| n.render(lang)).collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────

impl IntoResponse for ReleaseError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReleaseError::Wizard(WizardError::WrongStep { .. })
            | ReleaseError::Wizard(WizardError::SubmissionInFlight)
            | ReleaseError::Wizard(WizardError::WalletAlreadyGenerated)
            | ReleaseError::Wizard(WizardError::AlreadyReleased) => StatusCode::CONFLICT,
            ReleaseError::Wizard(_)
            | ReleaseError::Keygen(_)
            | ReleaseError::NoBotWallet => StatusCode::UNPROCESSABLE_ENTITY,
            ReleaseError::PlaintextExportDisabled => StatusCode::FORBIDDEN,
            ReleaseError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
            ReleaseError::Http(_) | ReleaseError::Rpc { .. } | ReleaseError::NotConnected => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn language(ctx: &AppContext, query: &LangQuery) -> Language {
    query
        .lang
        .as_deref()
        .map(Language::from_code)
        .unwrap_or(ctx.config.default_language)
}

type ApiResult<T> = Result<Json<T>, ReleaseError>;

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /wizard?lang=en|zh`
pub async fn get_wizard(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LangQuery>,
) -> ApiResult<WizardResponse> {
    let view = state.session.snapshot().await?;
    Ok(Json(WizardResponse::render(
        view,
        &state.ctx,
        language(&state.ctx, &query),
    )))
}

/// `POST /wizard/connect`
///
/// Asks the wallet to expose an account. The wizard picks up the result
/// asynchronously; poll `GET /wizard` for the outcome.
pub async fn connect(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LangQuery>,
) -> ApiResult<WizardResponse> {
    let view = state.session.connect().await?;
    Ok(Json(WizardResponse::render(
        view,
        &state.ctx,
        language(&state.ctx, &query),
    )))
}

/// `POST /wizard/identifier` `{ "value": "arweave_id::hash" }`
pub async fn submit_identifier(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LangQuery>,
    Json(body): Json<IdentifierRequest>,
) -> ApiResult<WizardResponse> {
    let view = state.session.input_identifier(body.value).await?;
    Ok(Json(WizardResponse::render(
        view,
        &state.ctx,
        language(&state.ctx, &query),
    )))
}

/// `POST /wizard/wallet`
pub async fn generate_wallet(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LangQuery>,
) -> ApiResult<WizardResponse> {
    let view = state.session.generate_wallet().await?;
    Ok(Json(WizardResponse::render(
        view,
        &state.ctx,
        language(&state.ctx, &query),
    )))
}

/// `POST /wizard/wallet/export` `{ "passphrase": "…" }` or `{ "plaintext": true }`
pub async fn export_wallet(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ExportRequest>,
) -> Result<impl IntoResponse, ReleaseError> {
    let file = state
        .session
        .export_wallet(body.passphrase, body.plaintext)
        .await?;
    Ok(Json(file))
}

/// `POST /wizard/confirmation` `{ "text": "CONFIRM" }`
pub async fn set_confirmation(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LangQuery>,
    Json(body): Json<ConfirmationRequest>,
) -> ApiResult<WizardResponse> {
    let view = state.session.set_confirmation(body.text).await?;
    Ok(Json(WizardResponse::render(
        view,
        &state.ctx,
        language(&state.ctx, &query),
    )))
}

/// `POST /wizard/release`
pub async fn release(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LangQuery>,
) -> ApiResult<WizardResponse> {
    let view = state.session.release().await?;
    Ok(Json(WizardResponse::render(
        view,
        &state.ctx,
        language(&state.ctx, &query),
    )))
}

/// `GET /souls/:hash`
///
/// Looks up a soul by its registration hash (`0x`-prefixed, 32 bytes).
pub async fn get_soul(
    State(state): State<Arc<ApiState>>,
    Path(hash): Path<String>,
) -> Response {
    let memory_hash = match B256::from_str(&hash) {
        Ok(h) => h,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("invalid hash: {e}"),
                }),
            )
                .into_response()
        }
    };

    match state.ctx.registry.feral_status(memory_hash).await {
        Ok(soul) => Json(SoulResponse {
            memory_hash,
            registered: soul.is_some(),
            soul,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
