use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    routing::post,
    Json, Router,
};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{JsonSendPayload, SendResponse, SendResult};
use crate::relay::{self, COMPLETED_MESSAGE};
use crate::state::AppState;
use crate::upload::{self, TempFiles};

/// Bulk send routes
pub fn send_routes() -> Router<AppState> {
    Router::new().route("/send-emails", post(send_emails))
}

/// POST /send-emails - Relay one message per recipient.
///
/// Accepts either `multipart/form-data` (with optional `attachments` files) or
/// `application/json`.
async fn send_emails(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SendResponse>> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &state).await?;

        let mut uploads = TempFiles::new(&state.config.upload_dir);
        let outcome = relay_multipart(&state, &mut multipart, &mut uploads).await;

        // Runs after validation and sending, whatever their outcome.
        if !uploads.is_empty() {
            let stored = uploads.len();
            let report = uploads.cleanup().await;
            tracing::debug!(
                stored,
                attempted = report.attempted,
                failed = report.failed,
                "Temporary uploads cleaned up"
            );
        }

        outcome
    } else if content_type.starts_with("application/json") {
        let body = Bytes::from_request(request, &state).await?;
        let payload: JsonSendPayload = serde_json::from_slice(&body)?;

        let request = relay::request_from_json(payload)?;
        let results = relay::relay_batch(&state.mailer, &request).await?;
        Ok(respond(&state.config, results))
    } else {
        Err(AppError::UnsupportedMediaType(if content_type.is_empty() {
            "none".to_string()
        } else {
            content_type
        }))
    }
}

async fn relay_multipart(
    state: &AppState,
    multipart: &mut Multipart,
    uploads: &mut TempFiles,
) -> Result<Json<SendResponse>> {
    let form = upload::read_send_form(multipart, uploads).await?;
    let request = relay::request_from_form(form, uploads.attachments().to_vec())?;

    tracing::info!(
        sender = %request.sender.email,
        recipients = request.recipients.len(),
        attachments = request.attachments.len(),
        "Relaying bulk email"
    );

    let results = relay::relay_batch(&state.mailer, &request).await?;
    Ok(respond(&state.config, results))
}

/// Per-recipient detail is only returned when the deployment opts in.
fn respond(config: &Config, results: Vec<SendResult>) -> Json<SendResponse> {
    Json(SendResponse {
        message: COMPLETED_MESSAGE.to_string(),
        results: config.expose_send_results.then_some(results),
    })
}
