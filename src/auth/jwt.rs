use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, warn};
use thiserror::Error;

use crate::auth::types::{AuthenticatedUser, Claims};
use crate::config::JwtSettings;

const ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token cannot be verified")]
    Invalid,

    #[error("token claims cannot be parsed")]
    Malformed,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// 签发与校验 JWT。密钥在构造时传入，之后只读，可在线程间共享
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validity: settings.validity,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
        }
    }

    pub fn issue(&self, identity: &AuthenticatedUser) -> Result<String, TokenError> {
        debug!("为用户 {} 生成 JWT token", identity.username);
        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.validity).ok_or_else(|| {
            error!("token 有效期超出可表示范围: {}", self.validity);
            TokenError::Signing("token validity overflows the expiry timestamp".to_string())
        })?;
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: identity.username.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            authorities: identity.authorities.clone(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            error!("为用户 {} 生成 token 失败: {}", identity.username, e);
            TokenError::Signing(e.to_string())
        })
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, TokenError> {
        let claims = self.decode_claims(token)?;
        if claims.sub.trim().is_empty() {
            warn!("token 缺少 subject");
            return Err(TokenError::Invalid);
        }
        Ok(AuthenticatedUser::new(claims.sub, claims.authorities))
    }

    /// 只取权限列表；请求链路上用 `verify` 一次拿到用户名和权限
    #[allow(dead_code)]
    pub fn authorities(&self, token: &str) -> Result<Vec<String>, TokenError> {
        self.verify(token).map(|user| user.authorities)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidSubject
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::ImmatureSignature => TokenError::Invalid,
                _ => TokenError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str, validity: Duration) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            validity,
            issuer: "Get Arrays, LLC".to_string(),
            audience: "User Management Portal".to_string(),
        }
    }

    fn service() -> TokenService {
        TokenService::new(&settings("test-secret-key-for-jwt", Duration::days(5)))
    }

    fn alice() -> AuthenticatedUser {
        AuthenticatedUser::new("alice", vec!["user:read".to_string()])
    }

    #[test]
    fn issued_token_verifies_with_same_identity() {
        let tokens = service();
        let token = tokens.issue(&alice()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1));
        let verified = tokens.verify(&token).unwrap();
        assert_eq!(verified, alice());
        assert_eq!(tokens.authorities(&token).unwrap(), vec!["user:read"]);
    }

    #[test]
    fn multiple_authorities_survive_round_trip() {
        let tokens = service();
        let identity = AuthenticatedUser::new(
            "root",
            vec![
                "user:read".to_string(),
                "user:create".to_string(),
                "user:update".to_string(),
                "user:delete".to_string(),
            ],
        );
        let token = tokens.issue(&identity).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), identity);
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let expired = TokenService::new(&settings("test-secret-key-for-jwt", Duration::seconds(-10)));
        let token = expired.issue(&alice()).unwrap();

        assert_eq!(service().verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn oversized_validity_fails_instead_of_overflowing() {
        let tokens = TokenService::new(&settings(
            "test-secret-key-for-jwt",
            Duration::seconds(1_000_000_000_000_000),
        ));
        assert!(matches!(tokens.issue(&alice()), Err(TokenError::Signing(_))));
    }

    #[test]
    fn token_from_another_key_is_invalid() {
        let other = TokenService::new(&settings("rotated-secret-key", Duration::days(5)));
        let token = other.issue(&alice()).unwrap();

        assert_eq!(service().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn foreign_issuer_is_invalid() {
        let mut foreign = settings("test-secret-key-for-jwt", Duration::days(5));
        foreign.issuer = "someone else".to_string();
        let token = TokenService::new(&foreign).issue(&alice()).unwrap();

        assert_eq!(service().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(service().verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(service().verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn empty_subject_is_invalid() {
        let tokens = service();
        let token = tokens
            .issue(&AuthenticatedUser::new("  ", vec!["user:read".to_string()]))
            .unwrap();
        assert_eq!(tokens.verify(&token), Err(TokenError::Invalid));
    }
}
