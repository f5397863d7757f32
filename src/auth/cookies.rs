use axum::http::{header, HeaderMap, HeaderValue};
use time::Duration;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// One `Set-Cookie` instruction produced by a session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: &'static str,
    pub value: String,
    /// `None` means the cookie is being cleared.
    pub max_age: Option<Duration>,
}

impl SetCookie {
    pub fn set(name: &'static str, value: impl Into<String>, max_age: Duration) -> Self {
        Self {
            name,
            value: value.into(),
            max_age: Some(max_age),
        }
    }

    pub fn clear(name: &'static str) -> Self {
        Self {
            name,
            value: String::new(),
            max_age: None,
        }
    }

    /// Renders the header value. Always `HttpOnly; Secure`.
    pub fn render(&self) -> String {
        match self.max_age {
            Some(age) => format!(
                "{}={}; Max-Age={}; HttpOnly; Secure; SameSite=Strict; Path=/",
                self.name,
                self.value,
                age.whole_seconds().max(0)
            ),
            None => format!(
                "{}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/",
                self.name
            ),
        }
    }
}

/// Turns cookie directives into response headers.
pub fn to_headers(cookies: &[SetCookie]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for c in cookies {
        // JWTs and cookie names are plain ASCII; anything else is dropped.
        match HeaderValue::from_str(&c.render()) {
            Ok(v) => {
                headers.append(header::SET_COOKIE, v);
            }
            Err(e) => tracing::error!(error = %e, cookie = c.name, "unrenderable cookie"),
        }
    }
    headers
}

/// Reads a cookie value from the request `Cookie` header(s).
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_is_http_only_and_secure() {
        let c = SetCookie::set(ACCESS_COOKIE, "abc.def.ghi", Duration::minutes(5));
        let rendered = c.render();
        assert!(rendered.starts_with("accessToken=abc.def.ghi;"));
        assert!(rendered.contains("Max-Age=300"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let rendered = SetCookie::clear(REFRESH_COOKIE).render();
        assert!(rendered.starts_with("refreshToken=;"));
        assert!(rendered.contains("Max-Age=0"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
    }

    #[test]
    fn to_headers_emits_one_header_per_cookie() {
        let headers = to_headers(&[SetCookie::clear(ACCESS_COOKIE), SetCookie::clear(REFRESH_COOKIE)]);
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn read_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=tok123; refreshToken="),
        );
        assert_eq!(read_cookie(&headers, ACCESS_COOKIE).as_deref(), Some("tok123"));
        assert_eq!(read_cookie(&headers, REFRESH_COOKIE), None);
        assert_eq!(read_cookie(&headers, "missing"), None);
    }
}
