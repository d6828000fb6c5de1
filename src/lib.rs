//! # Botdesk Dashboard Library
//!
//! Orchestration layer for a customer-support chatbot dashboard: session
//! management against an external auth backend, request gating, knowledge
//! ingestion against an external training API, and the embeddable widget.

pub mod chatbots;
pub mod clients;
pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod handlers;
pub mod server;
pub mod session;
pub mod shopify;
pub mod telemetry;
pub mod tokens;
pub mod widget;
pub mod wizards;
