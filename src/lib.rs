//! MISATO: chat session client for an AI persona backend.
//!
//! A user connects a wallet, waits for admission, then chats with the persona.
//! Replies may ask for an on-chain payment or kick off a background image job
//! that is polled until it finishes. Assistant text is split into sentence
//! fragments for an external voice sink.
//!
//! # Architecture
//!
//! - **API**: [`api::ChatApi`] over HTTP JSON, with one canonical parser per
//!   response shape
//! - **Session**: [`session::SessionController`] owns the conversation log and
//!   the connection/processing state machines
//! - **Heartbeat**: periodic liveness check suppressed during user activity
//! - **Poller**: image-generation status polling with stale-result protection
//! - **Speech**: sentence splitting and numeral normalization for the voice sink

pub mod api;
pub mod client_dirs;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod speech;
pub mod wallet;

pub use api::{ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use identity::{IdentityStore, SessionIdentity};
pub use session::{
    ConnectionState, ProcessingState, SendOutcome, SessionController, SessionSnapshot,
};
pub use speech::{SpeechFragment, VoiceSink};
pub use wallet::{WalletEvent, WalletInfo};
