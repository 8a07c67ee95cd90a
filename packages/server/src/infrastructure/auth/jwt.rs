//! HS256 JWT による AuthVerifier 実装
//!
//! `sub` クレームが数値のユーザー ID（数値または数値文字列）であること、
//! `exp` が過ぎていないことを検証する。

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::domain::{AuthError, AuthVerifier, UserId};

/// `sub` クレーム（発行元によって数値か文字列かが異なる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    Number(i64),
    Text(String),
}

/// JWT クレーム
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Subject,
    pub exp: u64,
}

impl Claims {
    fn user_id(&self) -> Result<UserId, AuthError> {
        match &self.sub {
            Subject::Number(id) => Ok(UserId::new(*id)),
            Subject::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(UserId::new)
                .map_err(|_| AuthError::InvalidToken(format!("non-numeric subject '{}'", text))),
        }
    }
}

pub struct JwtAuthVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl AuthVerifier for JwtAuthVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            },
        )?;
        data.claims.user_id()
    }
}
