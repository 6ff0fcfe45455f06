//! Conversation message model.

use crate::api::PaymentRequest;
use serde::{Deserialize, Serialize};

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The persona.
    Assistant,
    /// Client-generated notices (greeting, status, errors).
    System,
}

impl Role {
    /// Wire name used in conversation history.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// How a message is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text, possibly embedding image markup.
    Text,
    /// Standalone image.
    Image,
    /// Error notice.
    Error,
    /// On-chain transaction record.
    Transaction,
}

/// Marks messages that need a payment-action widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    /// Show the "send ETH" payment action.
    SendEth,
}

/// One entry of the conversation log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic id; uniqueness is the caller's responsibility.
    pub id: u64,
    /// Author role.
    pub role: Role,
    /// Render kind.
    pub kind: MessageKind,
    /// Message text.
    pub content: String,
    /// Local `HH:MM` time, stamped on append.
    pub time: Option<String>,
    /// Payment the persona asked for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_request: Option<PaymentRequest>,
    /// UI action marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_tag: Option<StatusTag>,
}

impl Message {
    /// A text message.
    pub fn text(id: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            kind: MessageKind::Text,
            content: content.into(),
            time: None,
            payment_request: None,
            status_tag: None,
        }
    }

    /// A system error notice.
    pub fn error(id: u64, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            ..Self::text(id, Role::System, content)
        }
    }

    /// A system record of a submitted payment transaction.
    pub fn transaction(id: u64, tx_hash: &str) -> Self {
        Self {
            kind: MessageKind::Transaction,
            ..Self::text(id, Role::System, tx_hash)
        }
    }

    /// An assistant message asking for payment.
    pub fn payment(id: u64, content: impl Into<String>, request: PaymentRequest) -> Self {
        Self {
            payment_request: Some(request),
            status_tag: Some(StatusTag::SendEth),
            ..Self::text(id, Role::Assistant, content)
        }
    }

    /// Whether this message belongs in the conversation history sent to the
    /// backend: user/assistant text turns that are not payment prompts.
    pub fn is_history_turn(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
            && self.kind == MessageKind::Text
            && self.payment_request.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> PaymentRequest {
        PaymentRequest {
            recipient_address: "0xabc".into(),
            price: "0.002".into(),
            network: "base".into(),
            chain_id: 8453,
        }
    }

    #[test]
    fn history_filter() {
        assert!(Message::text(1, Role::User, "hi").is_history_turn());
        assert!(Message::text(2, Role::Assistant, "hello").is_history_turn());
        assert!(!Message::text(3, Role::System, "greeting").is_history_turn());
        assert!(!Message::error(4, "oops").is_history_turn());
        assert!(!Message::transaction(5, "0xhash").is_history_turn());
        assert!(!Message::payment(6, "pay", payment()).is_history_turn());
    }

    #[test]
    fn payment_message_carries_tag() {
        let msg = Message::payment(7, "Please pay.", payment());
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.status_tag, Some(StatusTag::SendEth));
        assert_eq!(msg.payment_request.map(|p| p.chain_id), Some(8453));
    }

    #[test]
    fn serializes_camel_case() {
        let msg = Message::payment(7, "Please pay.", payment());
        let v = serde_json::to_value(&msg).unwrap_or_default();
        assert_eq!(v["statusTag"], "send_eth");
        assert_eq!(v["paymentRequest"]["chain_id"], 8453);
        assert_eq!(v["role"], "assistant");
    }
}
