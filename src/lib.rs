//! Terminal chat client for OpenAI and Anthropic models.

pub mod auth;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod export;
pub mod llm;
pub mod logging;
pub mod session;
pub mod speech;
pub mod topic;
pub mod ui;
