//! Content normalization shared by ingestion and the edit paths.

use sha2::{Digest, Sha256};

/// Maximum number of characters sent to the embedding provider per text.
pub const MAX_EMBED_CHARS: usize = 8000;

/// Content-address a knowledge entry for deduplication.
///
/// SHA-256 (lowercase hex) over `trim(lower(title)) || "||" || trim(lower(content))`.
/// Case and surrounding whitespace do not affect the hash; any other change does.
///
/// ```rust
/// use concierge_harness_core::content::compute_content_hash;
///
/// let a = compute_content_hash("Terraza", "Tenemos terraza exterior.");
/// let b = compute_content_hash("  TERRAZA ", "tenemos terraza exterior.\n");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn compute_content_hash(title: &str, content: &str) -> String {
    let normalized = format!(
        "{}||{}",
        title.trim().to_lowercase(),
        content.trim().to_lowercase()
    );
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Text that gets embedded for an entry.
pub fn build_embedding_text(title: &str, content: &str, section: Option<&str>) -> String {
    let text = match section {
        Some(section) if !section.trim().is_empty() => {
            format!("{} — {}\n\n{}", title, section, content)
        }
        _ => format!("{}\n\n{}", title, content),
    };
    truncate_chars(&text, MAX_EMBED_CHARS)
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
