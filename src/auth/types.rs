use serde::{Deserialize, Serialize};

use super::jwt::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub sub: String, // username
    pub iat: i64,
    pub exp: i64,
    pub authorities: Vec<String>,
}

/// 通过令牌验证的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub authorities: Vec<String>,
}

impl AuthenticatedUser {
    pub fn new(username: impl Into<String>, authorities: Vec<String>) -> Self {
        Self {
            username: username.into(),
            authorities,
        }
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}

/// 过滤器写入请求扩展中的认证结果
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// 没有携带令牌，或前缀不匹配
    NoToken,
    Verified(AuthenticatedUser),
    Rejected(TokenError),
}

impl AuthContext {
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            AuthContext::Verified(user) => Some(user),
            _ => None,
        }
    }
}
