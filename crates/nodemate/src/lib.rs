//! NodeMate - an AI-powered CLI assistant for Node.js package management.

pub mod cli;
pub mod config;
pub mod context;
pub mod llm;
pub mod npm;
pub mod process;
pub mod session;
pub mod ui;
