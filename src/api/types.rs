//! Wire types and canonical response parsing.
//!
//! The backend is loose about response shapes: payment and queue fields may
//! sit at the top level or be nested under a `status` object, numbers may be
//! sent as strings, and the admission endpoint answers in three different
//! dialects. Every response goes through exactly one `parse_*` function here
//! and comes out as a single canonical enum, so the session logic never looks
//! at raw JSON.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One prior turn sent as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// Body of `POST chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// The new user message.
    pub message: String,
    /// Prior user/assistant text turns, oldest first.
    pub conversation_history: Vec<HistoryTurn>,
    /// Durable session identifier.
    pub session_id: String,
    /// Connected wallet address.
    pub wallet_address: Option<String>,
    /// Pending request token, if any.
    pub request_id: Option<String>,
    /// Transaction hash of a payment made for this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_fee_hash: Option<String>,
}

/// On-chain payment the persona asks the user to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Address to pay.
    pub recipient_address: String,
    /// Price as sent by the server (kept as text to avoid float rounding).
    pub price: String,
    /// Human-readable network name.
    pub network: String,
    /// EVM chain id.
    pub chain_id: u64,
}

/// Canonical interpretation of a chat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// The server wants a payment before continuing.
    Payment {
        /// Payment details.
        request: PaymentRequest,
        /// Accompanying assistant text.
        content: String,
    },
    /// The session was (re)queued.
    Queued {
        /// Queue position reported by the server.
        position: u32,
    },
    /// Explicit business error.
    Error {
        /// Server-provided message.
        message: String,
    },
    /// Normal assistant reply.
    Reply {
        /// Assistant text.
        content: String,
        /// Background image job id, when generation was started.
        request_id: Option<String>,
    },
}

/// Canonical admission-check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The session may chat.
    Admitted,
    /// The session waits in the queue.
    Queued {
        /// Queue position.
        position: u32,
    },
    /// Neither admitted nor queued.
    Inactive,
}

/// Liveness check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatStatus {
    /// Whether the session is admitted.
    pub active: bool,
    /// Whether the session is queued.
    pub in_queue: bool,
    /// Queue position (meaningful only when `in_queue`).
    pub position: u32,
}

/// Image-generation job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    /// Job finished; `content` is the final assistant text (may embed image markup).
    Completed {
        /// Final content.
        content: String,
    },
    /// Job failed.
    Failed,
    /// Any other status; keep polling.
    Pending {
        /// Raw status value.
        status: String,
    },
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn position_of(v: &Value) -> u32 {
    as_u64(&v["position"])
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(0)
}

/// The object carrying payment/queue fields: a nested `status` object if
/// present, otherwise the body itself.
fn status_scope(body: &Value) -> &Value {
    if body["status"].is_object() {
        &body["status"]
    } else {
        body
    }
}

fn status_str(scope: &Value) -> Option<&str> {
    scope["status"].as_str()
}

fn extract_payment(scope: &Value) -> Option<PaymentRequest> {
    let recipient_address = as_text(&scope["recipient_address"])?;
    let price = as_text(&scope["price"])?;
    let network = as_text(&scope["network"])?;
    let chain_id = as_u64(&scope["chainId"]).or_else(|| as_u64(&scope["chain_id"]))?;
    Some(PaymentRequest {
        recipient_address,
        price,
        network,
        chain_id,
    })
}

fn content_of(body: &Value, scope: &Value) -> String {
    body["content"]
        .as_str()
        .or_else(|| scope["content"].as_str())
        .unwrap_or_default()
        .to_owned()
}

/// Interpret a chat response body.
///
/// Priority: payment request, queue signal, explicit error, normal reply.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] when the body matches none of the shapes.
pub fn parse_chat_reply(body: &Value) -> Result<ChatReply> {
    if !body.is_object() {
        return Err(ClientError::Parse(format!(
            "chat response is not an object: {body}"
        )));
    }
    let scope = status_scope(body);

    let paying = status_str(scope) == Some("paying");
    if let Some(request) = extract_payment(scope) {
        return Ok(ChatReply::Payment {
            request,
            content: content_of(body, scope),
        });
    }
    if paying {
        return Err(ClientError::Parse(
            "payment response is missing recipient/price/network/chainId".into(),
        ));
    }

    let queued = status_str(scope) == Some("full")
        || as_bool(&scope["inQueue"]) == Some(true)
        || as_bool(&body["inQueue"]) == Some(true);
    if queued {
        let position = if scope["position"].is_null() {
            position_of(body)
        } else {
            position_of(scope)
        };
        return Ok(ChatReply::Queued { position });
    }

    match &body["error"] {
        Value::Null => {}
        Value::String(message) => {
            return Ok(ChatReply::Error {
                message: message.clone(),
            });
        }
        other => {
            let message = other["message"]
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| other.to_string());
            return Ok(ChatReply::Error { message });
        }
    }

    let Some(content) = body["content"].as_str() else {
        return Err(ClientError::Parse(
            "chat response has no content field".into(),
        ));
    };
    let request_id = as_text(&body["request_id"]).filter(|id| !id.trim().is_empty());
    Ok(ChatReply::Reply {
        content: content.to_owned(),
        request_id,
    })
}

/// Interpret an admission-check response body.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] when the body matches none of the shapes.
pub fn parse_admission(body: &Value) -> Result<Admission> {
    if status_str(body) == Some("yes") {
        return Ok(Admission::Admitted);
    }
    if as_bool(&body["inQueue"]) == Some(true) {
        return Ok(Admission::Queued {
            position: position_of(body),
        });
    }
    match as_bool(&body["isActive"]) {
        Some(true) => Ok(Admission::Admitted),
        Some(false) => Ok(Admission::Inactive),
        None => Err(ClientError::Parse(format!(
            "unrecognised admission response: {body}"
        ))),
    }
}

/// Interpret a heartbeat response body.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] when `isActive` is absent or not boolean.
pub fn parse_heartbeat(body: &Value) -> Result<HeartbeatStatus> {
    let Some(active) = as_bool(&body["isActive"]) else {
        return Err(ClientError::Parse(format!(
            "heartbeat response has no isActive: {body}"
        )));
    };
    Ok(HeartbeatStatus {
        active,
        in_queue: as_bool(&body["inQueue"]).unwrap_or(false),
        position: position_of(body),
    })
}

/// Interpret a generation-status response body.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] when the body is not an object.
pub fn parse_generation_status(body: &Value) -> Result<GenerationStatus> {
    if !body.is_object() {
        return Err(ClientError::Parse(format!(
            "generation status is not an object: {body}"
        )));
    }
    let status = body["status"].as_str().unwrap_or_default();
    Ok(match status {
        "completed" => GenerationStatus::Completed {
            content: body["content"].as_str().unwrap_or_default().to_owned(),
        },
        "failed" => GenerationStatus::Failed,
        other => GenerationStatus::Pending {
            status: other.to_owned(),
        },
    })
}
