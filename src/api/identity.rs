use axum::http::HeaderMap;

use crate::models::context::Identity;

/// 从请求中解析调用者身份；解析不出时返回 None，由分发器决定是否拒绝
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// 信任上游网关写入的用户头 (默认 `x-user-id`)
pub struct HeaderIdentity {
    header: String,
}

impl HeaderIdentity {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

impl IdentityProvider for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let value = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(Identity::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_identity() {
        let provider = HeaderIdentity::new("X-User-Id");
        let mut headers = HeaderMap::new();
        assert_eq!(provider.resolve(&headers), None);

        headers.insert("x-user-id", HeaderValue::from_static("  "));
        assert_eq!(provider.resolve(&headers), None);

        headers.insert("x-user-id", HeaderValue::from_static("U1"));
        assert_eq!(provider.resolve(&headers), Some(Identity::new("U1")));
    }
}
