//! Size limits and fixed constants for the pipeline.
//!
//! Limits guard memory against oversized webhook bodies and AI responses.
//! The `#[validate]` derive macro requires literal values in attributes,
//! so some field limits are duplicated there. Keep both in sync.

// === Webhook Limits ===

/// Maximum webhook payload size in bytes (256KB).
pub const MAX_WEBHOOK_PAYLOAD_BYTES: usize = 256 * 1024;

/// Prefix of the signature header value: `sha256=<hex digest>`.
pub const WEBHOOK_SIGNATURE_PREFIX: &str = "sha256=";

/// Header carrying the webhook signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Ats-Signature";

// === Identifier Limits ===

/// External identifier pattern (ATS ids, tenant ids, template ids).
pub const EXTERNAL_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$";

/// Maximum external identifier length.
pub const MAX_EXTERNAL_ID_LEN: usize = 128;

// === Profile Limits ===

/// Maximum profile text sent to the analysis service (chars).
/// Resumes beyond this are truncated at a char boundary.
pub const MAX_PROFILE_TEXT_CHARS: usize = 48_000;

/// Maximum number of skills kept from a single analysis.
pub const MAX_SKILLS_PER_PROFILE: usize = 200;

// === Scoring Bounds ===

/// Skill levels are reported on a 0-5 scale.
pub const MAX_SKILL_LEVEL: f64 = 5.0;

/// Normalized scores live on 0-100.
pub const MAX_SCORE: f64 = 100.0;

// === Queue Bounds ===

/// Priority bounds for queue entries.
pub const MIN_PRIORITY: i32 = -1000;
pub const MAX_PRIORITY: i32 = 1000;

/// Clamp a caller-supplied priority into the accepted range.
pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Truncate text to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
