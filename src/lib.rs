//! # Exam Notifier Bot
//!
//! A Telegram bot that tells students about their upcoming exams.
//!
//! ## Features
//! - Reads the exam schedule from a shared spreadsheet
//! - Signup and menu flows for grade membership and notice horizon
//! - Weekly schedule broadcast, with a banner when the schedule changed
//! - Yearly grade promotion
//! - Admin menu: manage admins, look up users, broadcast messages
//! - Roster in a JSON file, conversation state in a sanitized snapshot

/// Bot command handlers and message processing
pub mod bot;
/// Configuration management and environment variables
pub mod config;
/// Conversation flows, guards, broadcast and promotion jobs
pub mod engine;
/// Background services: schedule source, cron jobs, health checks
pub mod services;
/// Roster, snapshot persistence and data models
pub mod storage;
/// Utility functions for dates, validation, logging and formatting
pub mod utils;
