use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Login used for the provider session; also the `From` of every message.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderAccount {
    pub email: String,
    pub app_password: String,
}

impl fmt::Debug for SenderAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderAccount")
            .field("email", &self.email)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

/// An uploaded file materialised on local disk for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub original_filename: String,
    pub stored_path: PathBuf,
    pub content_type: Option<String>,
}

/// Normalised bulk send, built once per HTTP request.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender: SenderAccount,
    pub recipients: Vec<String>,
    pub subject: String,
    pub content: String,
    pub signature: Option<String>,
    pub attachments: Vec<StoredAttachment>,
}

/// Text fields of the `multipart/form-data` entry point.
#[derive(Debug, Default, Clone)]
pub struct SendForm {
    pub email: Option<String>,
    pub app_password: Option<String>,
    /// JSON-encoded array of addresses.
    pub recipients: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub signature: Option<String>,
}

impl SendForm {
    /// Store a text part by its form field name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "email" => &mut self.email,
            "appPassword" => &mut self.app_password,
            "recipients" => &mut self.recipients,
            "subject" => &mut self.subject,
            "content" => &mut self.content,
            "signature" => &mut self.signature,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Body of the `application/json` entry point.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSendPayload {
    #[serde(default)]
    pub emails: Option<Vec<String>>,
    #[serde(default)]
    pub app_password: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Success,
    Error,
}

/// Outcome of one recipient's send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub recipient: String,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn success(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: SendStatus::Success,
            error: None,
        }
    }

    pub fn failure(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: SendStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SendResult>>,
}
