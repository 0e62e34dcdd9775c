//! Time formatting helpers.

/// Format a duration in milliseconds to a human-readable string.
pub fn format_duration(millis: u64) -> String {
    let secs = millis / 1000;
    if millis < 1000 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{:03}s", secs, millis % 1000)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
