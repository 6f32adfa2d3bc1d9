//! Helpers shared by the provider code

/// Minimum key length to display partial key
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 8;

/// Number of characters to show at start/end of masked key
const KEY_MASK_VISIBLE_CHARS: usize = 4;

/// Mask API key for safe display in logs
///
/// # Examples
/// ```
/// use cadence_llm::util::mask_api_key;
/// assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
/// assert_eq!(mask_api_key("short"), "****");
/// ```
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY || !key.is_ascii() {
        return "****".to_string();
    }
    format!(
        "{}...{}",
        &key[..KEY_MASK_VISIBLE_CHARS],
        &key[key.len() - KEY_MASK_VISIBLE_CHARS..]
    )
}

/// Truncate to at most `max_bytes` without splitting a UTF-8 character
#[must_use]
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Pull the command out of a model reply.
///
/// Trims whitespace and unwraps a surrounding markdown code fence, including
/// one with a language tag (```` ```bash ````).
#[must_use]
pub fn extract_command(reply: &str) -> String {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the language tag line, if any
    let body = match body.split_once('\n') {
        Some((tag, rest)) if !tag.trim().contains(' ') => rest,
        _ => body,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
        assert_eq!(mask_api_key("12345678"), "****");
    }

    #[test]
    fn test_truncate_safe() {
        assert_eq!(truncate_safe("hello", 10), "hello");
        assert_eq!(truncate_safe("hello", 3), "hel");
        assert_eq!(truncate_safe("héllo", 2), "h");
    }

    #[test]
    fn test_extract_plain_command() {
        assert_eq!(extract_command("  df -h /\n"), "df -h /");
    }

    #[test]
    fn test_extract_fenced_command() {
        assert_eq!(extract_command("```\nls -la\n```"), "ls -la");
        assert_eq!(extract_command("```bash\nrm -rf /tmp/cache/*\n```\n"), "rm -rf /tmp/cache/*");
        assert_eq!(extract_command("```sh\nuptime```"), "uptime");
    }

    #[test]
    fn test_extract_single_line_fence() {
        assert_eq!(extract_command("```echo hi```"), "echo hi");
    }
}
