use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    env_config::ServiceAuthConfig,
    error::{AppError, Res},
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceClaims {
    /// Name of the calling service ("billing" or "subscriptions").
    pub service: String,
    pub exp: usize,
}

/// Generates a short-lived bearer token for a service-to-service call.
pub fn generate_service_jwt(service: &str, config: &ServiceAuthConfig) -> Res<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(config.expiration_minutes))
        .expect("valid timestamp")
        .timestamp();

    let claims = ServiceClaims {
        service: service.to_string(),
        exp: expiration as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(AppError::from)
}

/// Extracts claims from a service bearer token. Requires the shared secret.
pub fn validate_service_jwt(token: &str, secret: &str) -> Res<ServiceClaims> {
    let token_data = jsonwebtoken::decode::<ServiceClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceAuthConfig {
        ServiceAuthConfig {
            secret: "test-secret".to_string(),
            expiration_minutes: 15,
        }
    }

    #[test]
    fn round_trips_claims() {
        let token = generate_service_jwt("billing", &config()).unwrap();
        let claims = validate_service_jwt(&token, "test-secret").unwrap();
        assert_eq!(claims.service, "billing");
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = generate_service_jwt("billing", &config()).unwrap();
        assert!(validate_service_jwt(&token, "other-secret").is_err());
    }
}
