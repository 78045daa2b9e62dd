//! Shared utility functions

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalize a shop domain for use in URLs and guard keys:
/// strip the scheme and any trailing slash.
pub fn normalize_domain(domain: &str) -> String {
    let d = domain.trim();
    let d = d
        .strip_prefix("https://")
        .or_else(|| d.strip_prefix("http://"))
        .unwrap_or(d);
    d.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_and_slash() {
        assert_eq!(normalize_domain("https://shop.example.com/"), "shop.example.com");
        assert_eq!(normalize_domain("http://shop.example.com"), "shop.example.com");
        assert_eq!(normalize_domain("shop.example.com"), "shop.example.com");
        assert_eq!(normalize_domain("  shop.example.com/ "), "shop.example.com");
    }
}
