use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::JwtConfig;
use crate::db::models::{CreateUser, User};
use crate::db::store::UserStore;
use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService<'a, S: ?Sized> {
    store: &'a S,
    jwt: &'a JwtConfig,
    bcrypt_cost: u32,
}

impl<'a, S: UserStore + ?Sized> AuthService<'a, S> {
    pub fn new(store: &'a S, jwt: &'a JwtConfig, bcrypt_cost: u32) -> Self {
        AuthService {
            store,
            jwt,
            bcrypt_cost,
        }
    }

    pub async fn needs_setup(&self) -> AppResult<bool> {
        Ok(self.store.count_users().await? == 0)
    }

    /// Create the single account. Only allowed while no user exists.
    pub async fn setup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> AppResult<(User, IssuedToken)> {
        if !self.needs_setup().await? {
            return Err(AppError::Forbidden);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        let email = normalize_email(email)?;
        check_password_policy(password)?;

        let password_hash = hash_password(password.to_string(), self.bcrypt_cost).await?;
        let user = self
            .store
            .create_user(
                CreateUser {
                    email,
                    password_hash,
                    name: name.to_string(),
                },
                Utc::now(),
            )
            .await?;

        info!("Initial account created: {}", user.id);
        let token = self.issue_token(&user.id)?;
        Ok((user, token))
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<(User, IssuedToken)> {
        let email = normalize_email(email).map_err(|_| AppError::Unauthorized)?;
        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                debug!("Login attempt for unknown email");
                return Err(AppError::Unauthorized);
            }
        };

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            debug!("Wrong password for user {}", user.id);
            return Err(AppError::Unauthorized);
        }

        info!("User {} logged in", user.id);
        let token = self.issue_token(&user.id)?;
        Ok((user, token))
    }

    pub async fn user_from_token(&self, token: &str) -> AppResult<User> {
        let claims = decode_jwt(self.jwt, token)?;
        self.store
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    fn issue_token(&self, user_id: &str) -> AppResult<IssuedToken> {
        let token = create_jwt(self.jwt, user_id)?;
        let claims = decode_jwt(self.jwt, &token)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("token expiry out of range")))?;
        Ok(IssuedToken { token, expires_at })
    }
}

/// Create a signed JWT for a user id
pub fn create_jwt(jwt: &JwtConfig, user_id: &str) -> AppResult<String> {
    let now = Utc::now();
    let exp = now + Duration::hours(jwt.expiration_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    )?;
    Ok(token)
}

/// Decode and validate a JWT, returning the claims
pub fn decode_jwt(jwt: &JwtConfig, token: &str) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation("invalid email address".to_string())),
    }
}

pub fn check_password_policy(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    if !(has_digit && has_upper && has_lower) {
        return Err(AppError::Validation(
            "password must contain a digit, an uppercase and a lowercase letter".to_string(),
        ));
    }
    Ok(())
}

// bcrypt is CPU bound; keep it off the async workers.
async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn jwt() -> JwtConfig {
        JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            expiration_hours: 1,
        }
    }

    #[tokio::test]
    async fn setup_then_login() {
        let store = MemoryStore::new();
        let jwt = jwt();
        let auth = AuthService::new(&store, &jwt, 4);

        assert!(auth.needs_setup().await.unwrap());
        let (user, token) = auth
            .setup("Ada", " Ada@Example.com ", "Secret123")
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(token.expires_at > Utc::now());
        assert!(!auth.needs_setup().await.unwrap());

        let (logged_in, token) = auth.login("ada@example.com", "Secret123").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(auth.user_from_token(&token.token).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn setup_is_forbidden_once_an_account_exists() {
        let store = MemoryStore::new();
        let jwt = jwt();
        let auth = AuthService::new(&store, &jwt, 4);
        auth.setup("Ada", "ada@example.com", "Secret123").await.unwrap();

        let err = auth
            .setup("Eve", "eve@example.com", "Secret123")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let store = MemoryStore::new();
        let jwt = jwt();
        let auth = AuthService::new(&store, &jwt, 4);
        auth.setup("Ada", "ada@example.com", "Secret123").await.unwrap();

        assert!(matches!(
            auth.login("ada@example.com", "Wrong1234").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.login("nobody@example.com", "Secret123").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn password_policy() {
        assert!(check_password_policy("Short1").is_err());
        assert!(check_password_policy("alllowercase1").is_err());
        assert!(check_password_policy("NoDigitsHere").is_err());
        assert!(check_password_policy("Secret123").is_ok());
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = create_jwt(&jwt(), "user-1").unwrap();
        assert_eq!(decode_jwt(&jwt(), &token).unwrap().sub, "user-1");

        let other = JwtConfig {
            secret: "ffffffffffffffffffffffffffffffff".to_string(),
            expiration_hours: 1,
        };
        assert!(matches!(decode_jwt(&other, &token), Err(AppError::Jwt(_))));
    }
}
