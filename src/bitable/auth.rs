//! Tenant access token acquisition.

use tracing::info;

use super::retry::RetryPolicy;
use super::types::{TokenRequest, TokenResponse};
use super::{decode_body, ApiError};

/// A tenant access token and its lifetime in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: i64,
}

/// Exchange app credentials for a tenant access token.
///
/// # Errors
///
/// Fails on transport exhaustion, an undecodable body, a non-zero `code`,
/// or an empty token.
pub async fn tenant_access_token(
    http: &reqwest::Client,
    base_url: &str,
    retry: &RetryPolicy,
    app_id: &str,
    app_secret: &str,
) -> Result<AccessToken, ApiError> {
    let url = format!(
        "{}/auth/v3/tenant_access_token/internal/",
        base_url.trim_end_matches('/')
    );
    let payload = TokenRequest { app_id, app_secret };

    let response = retry.send(|| http.post(&url).json(&payload)).await?;
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Body(e.to_string()))?;

    parse_token_response(&body)
}

fn parse_token_response(body: &str) -> Result<AccessToken, ApiError> {
    let decoded: TokenResponse = decode_body(body)?;

    if decoded.code != 0 {
        return Err(ApiError::Code {
            code: decoded.code,
            msg: decoded.msg,
        });
    }
    if decoded.tenant_access_token.is_empty() {
        return Err(ApiError::EmptyToken);
    }

    info!(expires_in = decoded.expire, "obtained tenant access token");
    Ok(AccessToken {
        token: decoded.tenant_access_token,
        expires_in: decoded.expire,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_success() {
        let token = parse_token_response(
            r#"{"code":0,"msg":"ok","tenant_access_token":"t-abc","expire":7200}"#,
        )
        .unwrap();
        assert_eq!(
            token,
            AccessToken {
                token: "t-abc".into(),
                expires_in: 7200
            }
        );
    }

    #[test]
    fn test_parse_token_nonzero_code() {
        let err = parse_token_response(r#"{"code":10014,"msg":"app secret invalid"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Code { code: 10014, .. }));
        assert!(err.to_string().contains("app secret invalid"));
    }

    #[test]
    fn test_parse_token_empty() {
        let err = parse_token_response(r#"{"code":0,"msg":"ok","tenant_access_token":""}"#).unwrap_err();
        assert!(matches!(err, ApiError::EmptyToken));
    }

    #[test]
    fn test_parse_token_garbage() {
        let err = parse_token_response("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
