use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structure des claims d'un JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Identifiant de l'utilisateur
    pub jti: String, // Identifiant du jeton, utilisé pour la révocation
    pub iat: usize,
    pub exp: usize, // Date d'expiration en timestamp UNIX
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Crée un JWT pour un utilisateur
pub fn create_token(
    user_id: i64,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(ttl_hours)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

/// Valide un JWT et renvoie les claims s'ils sont valides
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn issued_token_carries_user_and_unique_id() {
        let first = create_token(17, "secret", 1).unwrap();
        let second = create_token(17, "secret", 1).unwrap();

        let a = validate_token(&first, "secret").unwrap();
        let b = validate_token(&second, "secret").unwrap();
        assert_eq!(a.user_id(), Some(17));
        assert_ne!(a.jti, b.jti);
        assert!(a.expires_at() > Utc::now());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token(1, "secret", 1).unwrap();
        assert!(validate_token(&token, "autre-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        // au-delà de la tolérance par défaut de 60 secondes
        let token = create_token(1, "secret", -2).unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }
}
