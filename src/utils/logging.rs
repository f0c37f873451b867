use tracing::{error, info, warn, debug};

/// Logs a conversation flow moving between states
pub fn log_flow_transition(flow: &str, user_id: u64, from: Option<&str>, to: Option<&str>) {
    debug!(
        "FLOW: {} for user {} - {} -> {}",
        flow,
        user_id,
        from.unwrap_or("idle"),
        to.unwrap_or("end")
    );
}

/// Logs a handler that was refused by one of its guards
pub fn log_guard_rejection(guard: &str, action: &str, user_id: u64) {
    warn!("GUARD: {} refused {} for user {}", guard, action, user_id);
}

/// Logs a failed handler body with the context it ran in
pub fn log_handler_error(action: &str, user: &str, user_id: u64, chat_id: i64, error: &str) {
    error!(
        "HANDLER_ERROR: {} by {}({}) in chat {} - {}",
        action, user, user_id, chat_id, error
    );
}

/// Logs values dropped while preparing a persistence write
pub fn log_persist_warning(kind: &str, details: &str) {
    warn!("PERSIST: {} - {}", kind, details);
}

/// Logs a persistence write that was skipped entirely
pub fn log_persist_skipped(kind: &str, reason: &str) {
    warn!("PERSIST_SKIPPED: {} - {}", kind, reason);
}

/// Logs a single outbound delivery failure during a broadcast
pub fn log_send_failure(job: &str, chat_id: i64, error: &str) {
    warn!("SEND_FAILED: {} to chat {} - {}", job, chat_id, error);
}

/// Logs the summary of a finished broadcast
pub fn log_broadcast(job: &str, sent: usize, failed: usize, details: Option<&str>) {
    match details {
        Some(d) => info!("BROADCAST: {} sent={} failed={} - {}", job, sent, failed, d),
        None => info!("BROADCAST: {} sent={} failed={}", job, sent, failed),
    }
}

/// Logs system events with consistent format
pub fn log_system_event(event: &str, details: Option<&str>) {
    match details {
        Some(d) => info!("SYSTEM: {} - {}", event, d),
        None => info!("SYSTEM: {}", event),
    }
}
