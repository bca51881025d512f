use axum::http::HeaderMap;
use std::collections::HashMap;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Key shared by every caller that cannot be identified
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Read-only view over request headers
pub trait HeaderLookup {
    fn get(&self, name: &str) -> Option<&str>;
}

impl HeaderLookup for HeaderMap {
    fn get(&self, name: &str) -> Option<&str> {
        HeaderMap::get(self, name).and_then(|value| value.to_str().ok())
    }
}

/// Lookup over lowercase header names
impl HeaderLookup for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        HashMap::get(self, name).map(String::as_str)
    }
}

/// Derive the rate limit key for a caller.
///
/// The leftmost `X-Forwarded-For` hop is the original client; `X-Real-IP` is
/// the fallback. Callers without either header share the `"unknown"` key and
/// therefore one quota. Only trust these headers behind a proxy that sets them.
pub fn extract_client_ip<H: HeaderLookup + ?Sized>(headers: &H) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get(REAL_IP_HEADER)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
