/// HTTP health endpoints
pub mod health;
/// Cron jobs driving the weekly broadcast and yearly promotion
pub mod notifier;
/// Spreadsheet download, parsing and caching
pub mod schedule_source;
