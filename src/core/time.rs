use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

pub(crate) fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Attempt deadline: the duration-based deadline, cut short by the server's
/// `expires_at` when the exam window closes earlier.
pub(crate) fn compute_deadline(
    started_at: OffsetDateTime,
    duration_minutes: u32,
    server_expires_at: Option<OffsetDateTime>,
) -> OffsetDateTime {
    let duration_deadline = started_at + Duration::minutes(i64::from(duration_minutes));
    match server_expires_at {
        Some(expires_at) if expires_at < duration_deadline => expires_at,
        _ => duration_deadline,
    }
}

/// Time left until `deadline`, zero when it already passed.
pub(crate) fn remaining_until(
    deadline: OffsetDateTime,
    now: OffsetDateTime,
) -> std::time::Duration {
    let remaining = deadline - now;
    if remaining.is_negative() {
        return std::time::Duration::ZERO;
    }
    std::time::Duration::try_from(remaining).unwrap_or(std::time::Duration::ZERO)
}

pub(crate) fn format_remaining(remaining: std::time::Duration) -> String {
    let total_secs = remaining.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
