//! # Anonrelay - anonymous access-code gated channel relay
//!
//! Anonrelay republishes text that participants send to a bot in private
//! chats into one shared broadcast channel, replacing the sender's identity
//! with a stable pseudonymous alias such as `IT-407`.
//!
//! ## Features
//!
//! - **Access codes**: two shared secrets, one per role (IT / CN). The first
//!   valid code a participant sends fixes their role and issues their alias.
//! - **Unique aliases**: exact uniqueness across all participants, with a
//!   deterministic failure once a role's 900 aliases are used up.
//! - **Moderation**: the admin can ban an alias; banned users are dropped
//!   silently.
//! - **Single channel binding**: the admin binds the destination by running
//!   `/bind` inside the channel.
//! - **Durable state**: one JSON document, atomically rewritten on every
//!   mutation before any dependent reply is sent.
//! - **Telegram transport** (feature `telegram`): long-polling adapter built
//!   on teloxide.
//!
//! ## Module Organization
//!
//! - [`relay`] - relay core: access gate, identities, moderation, pipeline, server
//! - [`storage`] - state store
//! - [`config`] - configuration loading, environment overrides, validation
//! - [`validation`] - input shape checks
//! - [`logutil`] - single-line log escaping
//! - [`metrics`] - in-process counters
//! - `telegram` - Telegram transport (feature-gated)

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod relay;
pub mod storage;
#[cfg(feature = "telegram")]
pub mod telegram;
pub mod validation;
