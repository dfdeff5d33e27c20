use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use chrono::{DateTime, Utc};
use futures_util::future::{ok, ready, LocalBoxFuture, Ready};
use sqlx::MySqlPool;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::models::role::{AccountStatus, Role};
use crate::utils::jwt;

/// Session explicite de l'appelant, injectée dans chaque handler
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Accès réservé aux administrateurs"))
        }
    }

    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::forbidden(match role {
                Role::Conducteur => "Action réservée aux conducteurs",
                Role::Voyageur => "Action réservée aux voyageurs",
                Role::Admin => "Accès réservé aux administrateurs",
            }))
        }
    }
}

/// Refus du jeton, remis au handler qui réclame une `Session`
struct AuthRejection(AppError);

impl FromRequest for Session {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let mut extensions = req.extensions_mut();
        let session = match extensions.remove::<AuthRejection>() {
            Some(AuthRejection(err)) => Err(err),
            None => extensions
                .get::<Session>()
                .cloned()
                .ok_or_else(|| AppError::unauthorized("Authentification requise")),
        };
        ready(session)
    }
}

// Il vérifie que l'utilisateur est authentifié grâce au token JWT.
pub struct ExtractUser;

impl<S, B> Transform<S, ServiceRequest> for ExtractUser
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ExtractUserMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ExtractUserMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct ExtractUserMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ExtractUserMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            // La requête continue toujours ; seules les routes qui réclament une `Session` échouent
            if let Some(token) = bearer_token(&req) {
                let config = req.app_data::<web::Data<Config>>().cloned();
                let pool = req.app_data::<web::Data<MySqlPool>>().cloned();
                let outcome = match (config, pool) {
                    (Some(config), Some(pool)) => authenticate(&token, &config, &pool).await,
                    _ => Err(AppError::Internal("état applicatif absent".to_string())),
                };

                match outcome {
                    Ok(session) => {
                        debug!(user_id = session.user_id, "session authentifiée");
                        req.extensions_mut().insert(session);
                    }
                    Err(err) => {
                        debug!(error = %err, "jeton refusé");
                        req.extensions_mut().insert(AuthRejection(err));
                    }
                }
            }

            service.call(req).await
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

async fn authenticate(token: &str, config: &Config, pool: &MySqlPool) -> Result<Session, AppError> {
    let claims = jwt::validate_token(token, &config.jwt_secret)
        .map_err(|_| AppError::unauthorized("Jeton JWT invalide ou expiré"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::unauthorized("Identifiant utilisateur invalide dans le JWT"))?;

    let revoked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM revoked_tokens WHERE jti = ?")
        .bind(&claims.jti)
        .fetch_one(pool)
        .await?;
    if revoked > 0 {
        return Err(AppError::unauthorized("Session terminée, veuillez vous reconnecter"));
    }

    let row: Option<(String, String)> = sqlx::query_as("SELECT role, statut FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let (role, statut) = row.ok_or_else(|| AppError::unauthorized("Utilisateur introuvable"))?;
    let role = Role::try_from(role).map_err(AppError::Internal)?;
    let statut = AccountStatus::try_from(statut).map_err(AppError::Internal)?;

    if statut == AccountStatus::Bloque {
        warn!(user_id, "requête d'un compte bloqué refusée");
        return Err(AppError::forbidden("Votre compte a été bloqué"));
    }

    Ok(Session {
        user_id,
        role,
        token_id: claims.jti.clone(),
        expires_at: claims.expires_at(),
    })
}
