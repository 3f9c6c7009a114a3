pub mod agents;
pub mod app;
pub mod auth;
pub mod chat;
pub mod commerce;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompting;
pub mod store;
pub mod types;
pub mod validation;
pub mod widget;
