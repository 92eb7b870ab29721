//! The bulk send itself: normalise the request, compose the body, fan out one
//! message per recipient and collect every outcome.

use std::sync::Arc;

use futures::future::join_all;

use crate::error::{AppError, Result};
use crate::mail::{MailAttachment, Mailer, OutgoingMessage};
use crate::models::{
    JsonSendPayload, SendForm, SendRequest, SendResult, SenderAccount, StoredAttachment,
};

pub const COMPLETED_MESSAGE: &str = "Bulk email process completed.";

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// `content`, then two `<br>`, then the signature with its line breaks as `<br>`.
/// A missing or blank signature leaves the content untouched.
pub fn compose_body(content: &str, signature: Option<&str>) -> String {
    match signature.filter(|s| !s.trim().is_empty()) {
        Some(signature) => {
            let signature = signature.replace("\r\n", "<br>").replace('\n', "<br>");
            format!("{}<br><br>{}", content, signature)
        }
        None => content.to_string(),
    }
}

/// Decode the form's `recipients` field, a JSON array of address strings.
pub fn parse_recipients(raw: &str) -> Result<Vec<String>> {
    let recipients: Vec<String> = serde_json::from_str(raw)?;
    Ok(recipients.into_iter().map(|r| r.trim().to_string()).collect())
}

fn required(value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(AppError::MissingFields)
}

/// Validate the multipart form and attach the files already stored for it.
pub fn request_from_form(
    form: SendForm,
    attachments: Vec<StoredAttachment>,
) -> Result<SendRequest> {
    let email = required(form.email)?;
    let app_password = required(form.app_password)?;
    let recipients = required(form.recipients)?;
    let subject = required(form.subject)?;
    let content = required(form.content)?;

    let recipients = parse_recipients(&recipients)?;
    if recipients.is_empty() {
        return Err(AppError::MissingFields);
    }

    Ok(SendRequest {
        sender: SenderAccount {
            email: email.trim().to_string(),
            app_password,
        },
        recipients,
        subject,
        content,
        signature: form.signature,
        attachments,
    })
}

/// Validate the JSON entry point. It carries neither signature nor files.
pub fn request_from_json(payload: JsonSendPayload) -> Result<SendRequest> {
    let email = required(payload.email_address)?;
    let app_password = required(payload.app_password)?;
    let subject = required(payload.subject)?;
    let content = required(payload.body)?;

    let recipients: Vec<String> = payload
        .emails
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.trim().to_string())
        .collect();
    if recipients.is_empty() {
        return Err(AppError::MissingFields);
    }

    Ok(SendRequest {
        sender: SenderAccount {
            email: email.trim().to_string(),
            app_password,
        },
        recipients,
        subject,
        content,
        signature: None,
        attachments: Vec::new(),
    })
}

/// Read every stored upload once; the result is shared by all messages of the batch.
pub async fn load_attachments(stored: &[StoredAttachment]) -> Result<Arc<[MailAttachment]>> {
    let mut loaded = Vec::with_capacity(stored.len());
    for file in stored {
        let content = tokio::fs::read(&file.stored_path).await.map_err(|e| {
            AppError::Internal(format!(
                "Failed to read upload {}: {}",
                file.stored_path.display(),
                e
            ))
        })?;
        loaded.push(MailAttachment {
            filename: file.original_filename.clone(),
            content_type: file
                .content_type
                .clone()
                .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
            content,
        });
    }
    Ok(loaded.into())
}

/// Send one message per recipient over a single session.
///
/// All sends are in flight at once and every one is awaited; a failure is
/// recorded in that recipient's slot and never stops the others. Results keep
/// recipient order.
pub async fn relay_batch(mailer: &Mailer, request: &SendRequest) -> Result<Vec<SendResult>> {
    let html_body = compose_body(&request.content, request.signature.as_deref());
    let attachments = load_attachments(&request.attachments).await?;

    let session = match mailer.open_session(&request.sender) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(
                sender = %request.sender.email,
                error = %e,
                "Failed to open mail session"
            );
            let detail = e.to_string();
            return Ok(request
                .recipients
                .iter()
                .map(|recipient| SendResult::failure(recipient.clone(), detail.clone()))
                .collect());
        }
    };
    let session = session.as_ref();

    let sends = request.recipients.iter().map(|recipient| {
        let message = OutgoingMessage {
            from: request.sender.email.clone(),
            to: recipient.clone(),
            subject: request.subject.clone(),
            html_body: html_body.clone(),
            attachments: Arc::clone(&attachments),
        };

        async move {
            match session.send(&message).await {
                Ok(()) => {
                    tracing::info!(recipient = %message.to, "Email sent");
                    SendResult::success(message.to)
                }
                Err(e) => {
                    tracing::error!(recipient = %message.to, error = %e, "Error sending email");
                    SendResult::failure(message.to, e.to_string())
                }
            }
        }
    });

    let results = join_all(sends).await;

    let failed = results.iter().filter(|r| !r.is_success()).count();
    tracing::info!(
        sender = %request.sender.email,
        total = results.len(),
        failed,
        attachments = attachments.len(),
        "Batch settled"
    );

    Ok(results)
}
