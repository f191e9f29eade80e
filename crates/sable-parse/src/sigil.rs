//! Strictness sigils.

use sable_core::StrictLevel;

/// Decides a file's strictness level from a leading `# typed:` comment.
///
/// Only comment lines above the first non-comment line are considered; files
/// without a recognizable sigil default to [`StrictLevel::False`].
pub fn strict_level_of(text: &str) -> StrictLevel {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('#') {
            break;
        }
        let comment = line.trim_start_matches('#').trim();
        if let Some(value) = comment.strip_prefix("typed:") {
            return match value.trim() {
                "ignore" => StrictLevel::Ignore,
                "false" => StrictLevel::False,
                "true" => StrictLevel::True,
                "strict" => StrictLevel::Strict,
                _ => StrictLevel::False,
            };
        }
    }
    StrictLevel::False
}
