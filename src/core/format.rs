use chrono::Duration;

/// "2h 30m", "2h" or "45m".
pub fn format_duration(d: Duration) -> String {
    let hours = d.num_hours();
    let minutes = d.num_minutes() % 60;

    match (hours, minutes) {
        (h, m) if h > 0 && m > 0 => format!("{}h {}m", h, m),
        (h, _) if h > 0 => format!("{}h", h),
        (_, m) => format!("{}m", m),
    }
}

pub fn format_time_until(d: Duration) -> String {
    if d.num_minutes() < 1 {
        return "less than a minute".to_string();
    }
    format_duration(d)
}

pub fn format_days_until(d: Duration) -> String {
    let days = d.num_days();
    let hours = d.num_hours() % 24;

    match days {
        n if n > 1 && hours > 0 => format!("in {} days {}h", n, hours),
        n if n > 1 => format!("in {} days", n),
        1 if hours > 0 => format!("tomorrow ({}h from now)", d.num_hours()),
        1 => "tomorrow".to_string(),
        _ => format_time_until(d),
    }
}

/// Keeps the first five characters of an account number for logs.
pub fn mask_account_id(id: &str) -> String {
    match id.char_indices().nth(5) {
        Some((idx, _)) => format!("{}***", &id[..idx]),
        None => id.to_string(),
    }
}
