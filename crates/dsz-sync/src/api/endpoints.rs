//! API endpoint URL builders
//!
//! Helper functions to construct API endpoint URLs.

/// Build auth endpoint URL
pub fn auth_url(base_url: &str) -> String {
    format!("{}/auth", base_url.trim_end_matches('/'))
}

/// Build catalog root URL (used for log messages)
pub fn products_root_url(base_url: &str) -> String {
    format!("{}/v2/products", base_url.trim_end_matches('/'))
}

/// Build paginated catalog URL
pub fn products_url(base_url: &str, page: u32, limit: u32) -> String {
    format!("{}?page_no={}&limit={}", products_root_url(base_url), page, limit)
}
