//! revtrack: creator-platform revenue tracking with chat commands and
//! scheduled daily reports

pub mod cli;
pub mod commands;
pub mod config;
pub mod services;
pub mod telegram;
pub mod types;
