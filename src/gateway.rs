//! Delivery contract: inbound conversation events and the outbound
//! message surface.
//!
//! Transport proper (a chat platform, the local console) lives behind
//! [`DeliveryGateway`]; the dispatcher never sees anything else. Delivery is
//! best-effort for notifications: callers log failures and move on, the
//! dispatch loop never dies on a failed send.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub type ConversationId = i64;
pub type MessageId = i64;

/// A labeled button carrying an opaque callback payload.
///
/// Payloads are self-describing: `menu_generate`, `menu_view`, `menu_back`,
/// `report_<id>`, `view_<id>`, `add_<id>`, `remove_<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// An inbound event from the transport.
#[derive(Debug, Clone)]
pub struct Event {
    pub conversation: ConversationId,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// A command invocation, e.g. `/start`.
    Command(String),
    /// A button press on a previously sent message.
    ButtonPress { message: MessageId, payload: String },
    /// A free-text message.
    Text(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("delivery failed: {0}")]
    Send(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound message surface.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Send a text message, optionally with buttons. Returns the message id
    /// so it can be edited later.
    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, GatewayError>;

    /// Replace the text/buttons of a previously sent message.
    async fn edit_text(
        &self,
        conversation: ConversationId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), GatewayError>;

    /// Send a file attachment under a display filename.
    async fn send_document(
        &self,
        conversation: ConversationId,
        path: &Path,
        filename: &str,
    ) -> Result<(), GatewayError>;
}

#[async_trait]
impl<G: DeliveryGateway + ?Sized> DeliveryGateway for std::sync::Arc<G> {
    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, GatewayError> {
        (**self).send_text(conversation, text, buttons).await
    }

    async fn edit_text(
        &self,
        conversation: ConversationId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), GatewayError> {
        (**self).edit_text(conversation, message, text, buttons).await
    }

    async fn send_document(
        &self,
        conversation: ConversationId,
        path: &Path,
        filename: &str,
    ) -> Result<(), GatewayError> {
        (**self).send_document(conversation, path, filename).await
    }
}
