/// Time used when a ledger row has none.
pub const DEFAULT_TIME: &str = "13:00:00";

/// Normalize a ledger time to zero-padded `HH:MM:SS`.
///
/// Missing minute/second components become `00`; a blank value becomes
/// [`DEFAULT_TIME`]. Components are padded, not validated.
pub fn format_time(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return DEFAULT_TIME.to_string(),
    };

    let mut parts: Vec<String> = raw.split(':').map(|p| format!("{:0>2}", p.trim())).collect();
    while parts.len() < 3 {
        parts.push("00".to_string());
    }
    parts.join(":")
}
