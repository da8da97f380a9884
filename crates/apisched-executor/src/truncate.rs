//! Response body size limiting, ported from `_safe_read_body`.

pub const MAX_RESPONSE_BODY_SIZE: usize = 100 * 1024;

/// If `content_length` exceeds the cap, the body is never read and a
/// marker is stored instead. Otherwise the already-decoded `body` is
/// truncated with a trailing marker if it exceeds the cap.
pub fn truncate_response_body(content_length: Option<u64>, body: &str) -> String {
    if let Some(len) = content_length {
        if len as usize > MAX_RESPONSE_BODY_SIZE {
            return format!("[Response truncated - size {len} bytes exceeds limit]");
        }
    }

    if body.len() > MAX_RESPONSE_BODY_SIZE {
        let mut truncated = truncate_at_char_boundary(body, MAX_RESPONSE_BODY_SIZE).to_string();
        truncated.push_str("\n[...truncated...]");
        truncated
    } else {
        body.to_string()
    }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_over_cap_skips_reading_body() {
        let result = truncate_response_body(Some(200 * 1024), "ignored");
        assert_eq!(result, "[Response truncated - size 204800 bytes exceeds limit]");
    }

    #[test]
    fn content_length_under_cap_passes_body_through() {
        let result = truncate_response_body(Some(5), "hello");
        assert_eq!(result, "hello");
    }

    #[test]
    fn missing_content_length_truncates_decoded_body_when_oversized() {
        let big = "a".repeat(MAX_RESPONSE_BODY_SIZE + 10);
        let result = truncate_response_body(None, &big);
        assert!(result.ends_with("\n[...truncated...]"));
        assert_eq!(result.len(), MAX_RESPONSE_BODY_SIZE + "\n[...truncated...]".len());
    }

    #[test]
    fn missing_content_length_passes_through_small_body() {
        let result = truncate_response_body(None, "hi");
        assert_eq!(result, "hi");
    }
}
