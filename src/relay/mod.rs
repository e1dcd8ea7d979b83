//! # Relay Core Module
//!
//! Identity and relay logic for the anonymous relay: access-code validation,
//! alias issuance, moderation state and the decision pipeline that republishes
//! private messages into the bound channel.
//!
//! ## Components
//!
//! - [`server`] - [`RelayServer`], the single event-processing authority
//! - [`access`] - access-code classifier ([`access::Classification`])
//! - [`identity`] - alias issuance with exact uniqueness and bounded retries
//! - [`moderation`] - ban flag checks and mutation
//! - [`channel`] - relay destination binding
//! - [`pipeline`] - ordered eligibility checks and payload formatting
//! - [`admin`] - admin command parsing and replies
//! - [`transport`] - the seam to the chat network
//! - [`roles`] - the IT / CN roles
//!
//! ## Event Flow
//!
//! ```text
//! ┌─────────────────┐
//! │  Transport      │ ← inbound events, outbound deliveries
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  RelayServer    │ ← one event at a time
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  StateStore     │ ← users + bound channel, flushed per mutation
//! └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use anonrelay::config::Config;
//! use anonrelay::relay::{InboundEvent, RecordingTransport, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let transport = RecordingTransport::new();
//!     let mut server = RelayServer::new(config, transport.clone()).await?;
//!     server.handle_event(InboundEvent::private_text("42", "hello")).await;
//!     println!("{:?}", transport.deliveries());
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod admin;
pub mod channel;
pub mod error;
pub mod identity;
pub mod moderation;
pub mod pipeline;
pub mod roles;
pub mod server;
pub mod transport;

pub use error::{RelayError, RelayResult};
pub use roles::Role;
pub use server::{EventOutcome, RelayServer};
pub use transport::{ChatKind, FormatHint, InboundEvent, RecordingTransport, Transport};
