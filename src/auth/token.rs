//! Bearer credential resolution from a request's carriers.
//!
//! A request may present the access credential in several places; the
//! precedence between them is an explicit ordered list, not an if/else
//! cascade, so the contract is independently verifiable. The refresh
//! credential is different: it is accepted only from its httpOnly cookie,
//! never from a header or query parameter.

use axum::http::{HeaderMap, header};

use crate::types::{AccessToken, RefreshToken};

/// Cookie carrying the readable access credential.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// httpOnly cookie carrying the refresh credential.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Query parameters accepted as an access-credential carrier, in order.
pub const TOKEN_QUERY_PARAMS: [&str; 2] = ["access_token", "token"];

/// One place an access credential may travel in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    /// `Authorization: Bearer <token>` header.
    BearerHeader,
    /// `access_token` cookie.
    AccessCookie,
    /// `access_token` or `token` query parameter.
    QueryParam,
}

/// Carriers checked in order; the first hit wins.
pub const CARRIER_PRECEDENCE: [Carrier; 3] =
    [Carrier::BearerHeader, Carrier::AccessCookie, Carrier::QueryParam];

impl Carrier {
    fn extract(&self, headers: &HeaderMap, query: Option<&str>) -> Option<AccessToken> {
        match self {
            Carrier::BearerHeader => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .filter(|t| !t.is_empty())
                .map(AccessToken::from),
            Carrier::AccessCookie => {
                cookie_value(headers, ACCESS_TOKEN_COOKIE).map(AccessToken::new)
            }
            Carrier::QueryParam => {
                let query = query?;
                TOKEN_QUERY_PARAMS
                    .iter()
                    .find_map(|name| query_param(query, name))
                    .map(AccessToken::new)
            }
        }
    }
}

/// Credentials resolved from a single request.
///
/// Absence of both is a normal state (it triggers the refresh path or an
/// unauthenticated response), not an error.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    /// Access credential, from the highest-precedence carrier that had one.
    pub access: Option<AccessToken>,
    /// Which carrier supplied the access credential.
    pub carrier: Option<Carrier>,
    /// Refresh credential from the httpOnly cookie, if present.
    pub refresh: Option<RefreshToken>,
}

/// Resolve the request's credentials from its headers and query string.
pub fn resolve(headers: &HeaderMap, query: Option<&str>) -> RequestCredentials {
    let mut resolved = RequestCredentials {
        refresh: cookie_value(headers, REFRESH_TOKEN_COOKIE).map(RefreshToken::new),
        ..Default::default()
    };

    for carrier in CARRIER_PRECEDENCE {
        if let Some(token) = carrier.extract(headers, query) {
            resolved.access = Some(token);
            resolved.carrier = Some(carrier);
            break;
        }
    }

    resolved
}

/// Read a named cookie from the request's `Cookie` headers.
///
/// Walks every `Cookie` header (clients may send more than one) and the
/// `;`-separated pairs within each.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn query_param(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_bearer_header_resolves() {
        let headers = headers(&[("authorization", "Bearer tok-1")]);
        let creds = resolve(&headers, None);
        assert_eq!(creds.access, Some(AccessToken::new("tok-1")));
        assert_eq!(creds.carrier, Some(Carrier::BearerHeader));
    }

    #[test]
    fn test_header_beats_cookie() {
        let headers = headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "access_token=from-cookie"),
        ]);
        let creds = resolve(&headers, Some("access_token=from-query"));
        assert_eq!(creds.access, Some(AccessToken::new("from-header")));
        assert_eq!(creds.carrier, Some(Carrier::BearerHeader));
    }

    #[test]
    fn test_cookie_beats_query() {
        let headers = headers(&[("cookie", "access_token=from-cookie")]);
        let creds = resolve(&headers, Some("access_token=from-query"));
        assert_eq!(creds.access, Some(AccessToken::new("from-cookie")));
        assert_eq!(creds.carrier, Some(Carrier::AccessCookie));
    }

    #[test]
    fn test_query_param_fallback_in_order() {
        let headers = HeaderMap::new();
        let creds = resolve(&headers, Some("token=second&access_token=first"));
        assert_eq!(creds.access, Some(AccessToken::new("first")));
        assert_eq!(creds.carrier, Some(Carrier::QueryParam));

        let creds = resolve(&headers, Some("token=only"));
        assert_eq!(creds.access, Some(AccessToken::new("only")));
    }

    #[test]
    fn test_absence_is_not_an_error() {
        let creds = resolve(&HeaderMap::new(), None);
        assert!(creds.access.is_none());
        assert!(creds.carrier.is_none());
        assert!(creds.refresh.is_none());
    }

    #[test]
    fn test_malformed_authorization_ignored() {
        // Not a bearer scheme: fall through to the next carrier.
        let basic_headers = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("cookie", "access_token=cookie-tok"),
        ]);
        let creds = resolve(&basic_headers, None);
        assert_eq!(creds.access, Some(AccessToken::new("cookie-tok")));

        // Empty bearer value counts as absent.
        let headers = headers(&[("authorization", "Bearer ")]);
        assert!(resolve(&headers, None).access.is_none());
    }

    #[test]
    fn test_refresh_only_from_cookie() {
        let headers = headers(&[
            ("authorization", "Bearer acc"),
            ("cookie", "refresh_token=ref-1; access_token=acc-1"),
        ]);
        // A refresh token in the query string must not be picked up.
        let creds = resolve(&headers, Some("refresh_token=from-query"));
        assert_eq!(creds.refresh, Some(RefreshToken::new("ref-1")));
    }

    #[test]
    fn test_multiple_cookie_headers() {
        let headers = headers(&[
            ("cookie", "theme=dark"),
            ("cookie", "access_token=tok; refresh_token=ref"),
        ]);
        let creds = resolve(&headers, None);
        assert_eq!(creds.access, Some(AccessToken::new("tok")));
        assert_eq!(creds.refresh, Some(RefreshToken::new("ref")));
    }

    #[test]
    fn test_url_encoded_query_value() {
        let creds = resolve(&HeaderMap::new(), Some("access_token=a%2Bb"));
        assert_eq!(creds.access, Some(AccessToken::new("a+b")));
    }
}
