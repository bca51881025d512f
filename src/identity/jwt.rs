use super::{AuthorizationContext, Role};
use crate::config::JwtConfig;
use crate::error::{GuardError, Result};
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims issued by the identity service
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Caller role
    pub role: Role,
    /// Owning school of the caller, absent for system-wide accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

/// Verifies bearer tokens and yields the caller's authorization context
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Create a new verifier from configuration
    pub fn new(config: &JwtConfig) -> Result<Self> {
        let algorithm = Self::parse_algorithm(&config.algorithm)?;

        let decoding_key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = config.secret.as_ref().ok_or_else(|| {
                    GuardError::Config(
                        "JWT secret is required for HS256/HS384/HS512 algorithms".to_string(),
                    )
                })?;
                DecodingKey::from_secret(secret.as_bytes())
            }
            _ => {
                let public_key = config.public_key.as_ref().ok_or_else(|| {
                    GuardError::Config(
                        "JWT public key is required for RS256/RS384/RS512 algorithms".to_string(),
                    )
                })?;
                DecodingKey::from_rsa_pem(public_key.as_bytes()).map_err(|e| {
                    GuardError::Config(format!("Invalid RSA public key: {}", e))
                })?
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Verify the bearer token in `headers`
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthorizationContext> {
        let token = Self::extract_token(headers)?;

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| GuardError::InvalidToken(format!("Token validation failed: {}", e)))?
            .claims;

        Ok(AuthorizationContext::new(
            claims.sub,
            claims.role,
            claims.school_id,
        ))
    }

    /// Extract the token from the Authorization header
    fn extract_token(headers: &HeaderMap) -> Result<&str> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .ok_or(GuardError::Unauthenticated)?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| GuardError::InvalidToken("Invalid authorization header".to_string()))?;

        auth_str
            .strip_prefix("Bearer ")
            .or_else(|| auth_str.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                GuardError::InvalidToken(
                    "Authorization header must start with 'Bearer '".to_string(),
                )
            })
    }

    /// Parse algorithm string to Algorithm enum
    fn parse_algorithm(algo: &str) -> Result<Algorithm> {
        match algo.to_uppercase().as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            "RS256" => Ok(Algorithm::RS256),
            "RS384" => Ok(Algorithm::RS384),
            "RS512" => Ok(Algorithm::RS512),
            _ => Err(GuardError::Config(format!(
                "Unsupported algorithm: {}",
                algo
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key";

    fn create_test_token(secret: &str, claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(role: Role, school_id: Option<&str>, exp_offset: chrono::Duration) -> Claims {
        Claims {
            sub: "user123".to_string(),
            role,
            school_id: school_id.map(str::to_string),
            iss: None,
            aud: None,
            exp: (chrono::Utc::now() + exp_offset).timestamp() as usize,
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_verifier_missing_secret() {
        let config = JwtConfig {
            secret: None,
            public_key: None,
            algorithm: "HS256".to_string(),
            issuer: None,
            audience: None,
        };
        assert!(JwtVerifier::new(&config).is_err());
    }

    #[test]
    fn test_verifier_unsupported_algorithm() {
        let mut config = JwtConfig::hs256(SECRET);
        config.algorithm = "none".to_string();
        assert!(JwtVerifier::new(&config).is_err());
    }

    #[test]
    fn test_valid_token_yields_context() {
        let verifier = JwtVerifier::new(&JwtConfig::hs256(SECRET)).unwrap();
        let token = create_test_token(
            SECRET,
            &claims(Role::Teacher, Some("school-a"), chrono::Duration::hours(1)),
        );

        let ctx = verifier.authenticate(&bearer(&token)).unwrap();
        assert_eq!(ctx.user_id, "user123");
        assert_eq!(ctx.role, Role::Teacher);
        assert_eq!(ctx.scope.as_deref(), Some("school-a"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new(&JwtConfig::hs256(SECRET)).unwrap();
        let token = create_test_token(
            SECRET,
            &claims(Role::Teacher, Some("school-a"), chrono::Duration::hours(-1)),
        );

        let err = verifier.authenticate(&bearer(&token)).unwrap_err();
        assert!(matches!(err, GuardError::InvalidToken(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::new(&JwtConfig::hs256(SECRET)).unwrap();
        let token = create_test_token(
            "other-secret",
            &claims(Role::SystemAdmin, None, chrono::Duration::hours(1)),
        );
        assert!(verifier.authenticate(&bearer(&token)).is_err());
    }

    #[test]
    fn test_missing_header() {
        let verifier = JwtVerifier::new(&JwtConfig::hs256(SECRET)).unwrap();
        let err = verifier.authenticate(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GuardError::Unauthenticated));
    }

    #[test]
    fn test_invalid_bearer_format() {
        let verifier = JwtVerifier::new(&JwtConfig::hs256(SECRET)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "InvalidToken".parse().unwrap());
        assert!(verifier.authenticate(&headers).is_err());
    }
}
