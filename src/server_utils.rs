use crate::constants::{COUNTDOWN_STEP_MS, MAX_GAME_DURATION_MS, MIN_GAME_DURATION_MS};

pub const MAX_NAME_CHARS: usize = 16;
pub const ROOM_ID_LEN: usize = 8;

pub fn sanitize_name(value: Option<&str>, fallback: &str) -> String {
    let trimmed = value.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(MAX_NAME_CHARS).collect()
}

/// Requested game length in ms, rounded to whole countdown steps and
/// clamped to one to sixty minutes.
pub fn normalize_duration_ms(value: Option<i64>, default_ms: u64) -> u64 {
    match value {
        None => default_ms,
        Some(ms) => {
            let half_step = COUNTDOWN_STEP_MS / 2;
            let steps = (ms.max(0) as u64).saturating_add(half_step) / COUNTDOWN_STEP_MS;
            (steps * COUNTDOWN_STEP_MS).clamp(MIN_GAME_DURATION_MS, MAX_GAME_DURATION_MS)
        }
    }
}

/// Lowercases a client-supplied room id; anything that could not be one is rejected.
pub fn normalize_room_id(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    let valid = normalized.len() == ROOM_ID_LEN
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    valid.then_some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_applies_trim_empty_and_max_len() {
        assert_eq!(sanitize_name(None, "Player2"), "Player2");
        assert_eq!(sanitize_name(Some("   "), "Player1"), "Player1");
        assert_eq!(sanitize_name(Some(" Anjali "), "Player1"), "Anjali");
        assert_eq!(
            sanitize_name(Some("12345678901234567890"), "Player1"),
            "1234567890123456"
        );
    }

    #[test]
    fn duration_clamps_to_minute_bounds() {
        assert_eq!(normalize_duration_ms(None, 300_000), 300_000);
        assert_eq!(normalize_duration_ms(Some(-5), 300_000), 60_000);
        assert_eq!(normalize_duration_ms(Some(10), 300_000), 60_000);
        assert_eq!(normalize_duration_ms(Some(120_000), 300_000), 120_000);
        assert_eq!(normalize_duration_ms(Some(99_999_999), 300_000), 3_600_000);
        assert_eq!(normalize_duration_ms(Some(i64::MAX), 300_000), 3_600_000);
    }

    #[test]
    fn duration_rounds_to_whole_seconds() {
        assert_eq!(normalize_duration_ms(Some(90_400), 300_000), 90_000);
        assert_eq!(normalize_duration_ms(Some(90_500), 300_000), 91_000);
        assert_eq!(normalize_duration_ms(Some(119_999), 300_000), 120_000);
        assert_eq!(normalize_duration_ms(Some(3_600_400), 300_000), 3_600_000);
    }

    #[test]
    fn room_ids_are_normalized_or_rejected() {
        assert_eq!(normalize_room_id(" AB12cd34 ").as_deref(), Some("ab12cd34"));
        assert_eq!(normalize_room_id("short"), None);
        assert_eq!(normalize_room_id("ab12-d34"), None);
    }
}
