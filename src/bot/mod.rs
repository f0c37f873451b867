/// Slash commands and keyboard labels
pub mod commands;
/// Telegram update handling and delivery
pub mod handlers;
/// Hebrew message templates
pub mod texts;
