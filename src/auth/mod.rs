//! API key authentication module.
//!
//! Accepts the key as a bearer token or an `x-api-key` header and compares it
//! in constant time. Each key belongs to an owner; the matching owner is attached
//! to the request as a [`Caller`] for per-group authorization.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::config::{ApiKey, DEFAULT_OWNER};
use crate::errors::AppError;
use crate::models::Group;

/// Alternative header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub owner: String,
}

impl Caller {
    /// Fail with 403 unless the caller owns `group`.
    pub fn authorize(&self, group: &Group) -> Result<(), AppError> {
        if group.owner == self.owner {
            Ok(())
        } else {
            tracing::warn!(group_id = group.id, caller = %self.owner, "Group access denied");
            Err(AppError::Forbidden("Access denied".to_string()))
        }
    }
}

/// Authentication layer function that takes the accepted keys as a parameter.
pub async fn api_key_layer(keys: Arc<Vec<ApiKey>>, mut request: Request, next: Next) -> Response {
    // If no key is configured, allow all requests (dev mode)
    if keys.is_empty() {
        request.extensions_mut().insert(Caller {
            owner: DEFAULT_OWNER.to_string(),
        });
        return next.run(request).await;
    }

    let Some(provided) = provided_key(request.headers()) else {
        return AppError::Unauthorized("API key not set".to_string()).into_response();
    };

    match find_owner(&keys, &provided) {
        Some(owner) => {
            request.extensions_mut().insert(Caller {
                owner: owner.to_string(),
            });
            next.run(request).await
        }
        None => AppError::Unauthorized("Invalid API key".to_string()).into_response(),
    }
}

/// Owner of the key matching `provided`. Every key is compared.
fn find_owner<'a>(keys: &'a [ApiKey], provided: &str) -> Option<&'a str> {
    keys.iter().fold(None, |found, key| {
        let hit = constant_time_compare(provided, &key.key);
        found.or(hit.then_some(key.owner.as_str()))
    })
}

/// Extract the API key, preferring the bearer token.
fn provided_key(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string());

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    })
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    #[test]
    fn test_find_owner() {
        let keys = vec![
            ApiKey {
                owner: "alice".to_string(),
                key: "k1".to_string(),
            },
            ApiKey {
                owner: "bob".to_string(),
                key: "k2".to_string(),
            },
        ];

        assert_eq!(find_owner(&keys, "k2"), Some("bob"));
        assert_eq!(find_owner(&keys, "k3"), None);
    }

    #[test]
    fn test_authorize_checks_owner() {
        let group = Group {
            id: 3,
            owner: "alice".to_string(),
            name: "Ops".to_string(),
            modified_date: String::new(),
            targets: Vec::new(),
        };
        let alice = Caller {
            owner: "alice".to_string(),
        };
        let bob = Caller {
            owner: "bob".to_string(),
        };

        assert!(alice.authorize(&group).is_ok());
        let err = bob.authorize(&group).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(err.message(), "Access denied");
    }

    #[test]
    fn test_provided_key_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("header-key"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer bearer-key"),
        );

        assert_eq!(provided_key(&headers).as_deref(), Some("bearer-key"));
    }

    #[test]
    fn test_provided_key_falls_back_to_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("header-key"));

        assert_eq!(provided_key(&headers).as_deref(), Some("header-key"));
        assert_eq!(provided_key(&HeaderMap::new()), None);
    }
}
