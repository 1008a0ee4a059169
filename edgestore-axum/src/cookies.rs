//! Minimal `Cookie` / `Set-Cookie` handling for the context and provider tokens.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;

/// All cookies on the request. Later duplicates win.
pub fn parse(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            let k = k.trim();
            (!k.is_empty()).then(|| (k.to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    parse(headers).remove(name).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct CookieSpec<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub max_age: Duration,
    pub http_only: bool,
    pub secure: bool,
}

impl CookieSpec<'_> {
    pub fn to_header(&self) -> String {
        let mut out = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Strict",
            self.name,
            self.value,
            self.max_age.as_secs()
        );
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1; edgestore-ctx=tok"));
        headers.append(COOKIE, HeaderValue::from_static("b=\"2\""));

        let jar = parse(&headers);
        assert_eq!(jar.get("edgestore-ctx").map(String::as_str), Some("tok"));
        assert_eq!(jar.get("b").map(String::as_str), Some("2"));
        assert_eq!(get(&headers, "missing"), None);
    }

    #[test]
    fn set_cookie_flags() {
        let header = CookieSpec {
            name: "edgestore-ctx",
            value: "v",
            max_age: Duration::from_secs(60),
            http_only: true,
            secure: false,
        }
        .to_header();
        assert_eq!(header, "edgestore-ctx=v; Path=/; Max-Age=60; SameSite=Strict; HttpOnly");
    }
}
