//! Session cookie rendering and parsing.

use axum::http::{header, HeaderMap};

/// Shape of the session cookie; the token itself is the value.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Set-Cookie` value for a freshly issued token.
    pub fn build_set_cookie(&self, token: &str, max_age_secs: i64) -> String {
        let mut parts = vec![
            format!("{}={}", self.name, token),
            "Path=/".to_string(),
            format!("Max-Age={}", max_age_secs),
            "HttpOnly".to_string(),
            "SameSite=Strict".to_string(),
        ];
        if self.secure {
            parts.push("Secure".to_string());
        }
        parts.join("; ")
    }

    /// Expires the cookie immediately.
    pub fn build_clear_cookie(&self) -> String {
        self.build_set_cookie("", 0)
    }

    pub fn extract_from_header(&self, cookie_header: &str) -> Option<String> {
        cookie_header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.name && !value.is_empty()).then(|| value.to_string())
        })
    }

    /// Reads the token from any `Cookie` header on the request.
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|raw| self.extract_from_header(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn set_cookie_is_http_only_and_strict() {
        let cookie = SessionCookie::new("access_token", false);
        let value = cookie.build_set_cookie("abc.def.ghi", 1800);
        assert_eq!(
            value,
            "access_token=abc.def.ghi; Path=/; Max-Age=1800; HttpOnly; SameSite=Strict"
        );

        let secure = SessionCookie::new("access_token", true).build_set_cookie("t", 60);
        assert!(secure.ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_has_zero_max_age() {
        let value = SessionCookie::new("access_token", false).build_clear_cookie();
        assert!(value.starts_with("access_token=; Path=/; Max-Age=0"));
    }

    #[test]
    fn extracts_named_cookie() {
        let cookie = SessionCookie::new("access_token", false);
        assert_eq!(
            cookie.extract_from_header("theme=dark; access_token=tok123; other=1"),
            Some("tok123".to_string())
        );
        assert_eq!(cookie.extract_from_header("access_token="), None);
        assert_eq!(cookie.extract_from_header("token=x"), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=zz"));
        assert_eq!(cookie.extract(&headers), Some("zz".to_string()));
    }
}
