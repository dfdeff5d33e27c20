use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};
use validator::Validate;

use crate::config::Config;
use crate::error::{is_unique_violation, AppError};
use crate::models::role::{AccountStatus, Role};
use crate::models::user::{LoginForm, RegisterForm, User, UserView, USER_COLUMNS};
use crate::utils::extract_user::Session;
use crate::utils::validation::non_empty;
use crate::utils::{hash, jwt};

/// Charge un utilisateur par son identifiant
pub(crate) async fn find_user(pool: &MySqlPool, user_id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub(crate) async fn require_user(pool: &MySqlPool, user_id: i64) -> Result<User, AppError> {
    find_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Utilisateur introuvable"))
}

/// Rôle attribué à l'inscription : le code d'accès admin prime sur le rôle demandé
fn registration_role(form: &RegisterForm, config: &Config) -> Result<Role, AppError> {
    if let Some(ref code) = form.access_code {
        if config.is_admin_code(code) {
            return Ok(Role::Admin);
        }
    }
    match form.role {
        None => Ok(Role::Voyageur),
        Some(Role::Admin) => Err(AppError::field("access_code", "Code d'accès administrateur invalide")),
        Some(role) => Ok(role),
    }
}

/// Route pour l'inscription des utilisateurs
#[post("/register")]
async fn register(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    form: web::Json<RegisterForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;
    let role = registration_role(&form, &config)?;

    // Vérifier si l'email est déjà utilisé
    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&form.email)
        .fetch_one(pool.get_ref())
        .await?;
    if taken > 0 {
        return Err(AppError::field("email", "Email déjà utilisé"));
    }

    let hashed_password = hash::hash_password(&form.password, config.bcrypt_cost)?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password, role, phone) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(form.name.trim())
    .bind(&form.email)
    .bind(&hashed_password)
    .bind(role.as_str())
    .bind(non_empty(form.phone.as_deref()))
    .execute(pool.get_ref())
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::field("email", "Email déjà utilisé")
        } else {
            AppError::Database(err)
        }
    })?;

    let user = require_user(pool.get_ref(), result.last_insert_id() as i64).await?;
    let token = jwt::create_token(user.id, &config.jwt_secret, config.jwt_ttl_hours)?;
    info!(user_id = user.id, role = role.as_str(), "nouvel utilisateur inscrit");

    Ok(HttpResponse::Created().json(json!({
        "token": token,
        "user": UserView::from(user),
    })))
}

/// Route pour la connexion des utilisateurs
#[post("/login")]
async fn login(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, AppError> {
    // Rechercher l'utilisateur par email
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(&form.email)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::unauthorized("Identifiants invalides"))?;

    // Vérifier le mot de passe
    if !hash::verify_password(&form.password, &user.password) {
        return Err(AppError::unauthorized("Identifiants invalides"));
    }

    if user.statut == AccountStatus::Bloque {
        warn!(user_id = user.id, "tentative de connexion d'un compte bloqué");
        return Err(AppError::forbidden("Votre compte a été bloqué"));
    }

    let token = jwt::create_token(user.id, &config.jwt_secret, config.jwt_ttl_hours)?;

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user": UserView::from(user),
    })))
}

/// Révoque le jeton courant jusqu'à son expiration
#[post("/logout")]
async fn logout(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    sqlx::query("INSERT IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?, ?)")
        .bind(&session.token_id)
        .bind(session.expires_at)
        .execute(pool.get_ref())
        .await?;

    // Les jetons expirés sont de toute façon refusés par la validation JWT
    sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Déconnexion réussie" })))
}

/// Utilisateur correspondant au jeton, utilisé par le client pour revalider sa session
#[get("/user")]
async fn current_user(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    let user = require_user(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

/// Configuration des routes d'authentification
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(register);
    cfg.service(login);
    cfg.service(logout);
    cfg.service(current_user);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn form(role: Option<Role>, access_code: Option<&str>) -> RegisterForm {
        RegisterForm {
            name: "Amine".to_string(),
            email: "amine@example.ma".to_string(),
            password: "motdepasse".to_string(),
            password_confirmation: "motdepasse".to_string(),
            phone: None,
            role,
            access_code: access_code.map(str::to_string),
        }
    }

    #[test]
    fn default_role_is_traveler() {
        assert_eq!(registration_role(&form(None, None), &test_config()).unwrap(), Role::Voyageur);
        assert_eq!(
            registration_role(&form(Some(Role::Conducteur), None), &test_config()).unwrap(),
            Role::Conducteur
        );
    }

    #[test]
    fn admin_requires_the_access_code() {
        let config = test_config();
        assert_eq!(
            registration_role(&form(None, Some("code-admin")), &config).unwrap(),
            Role::Admin
        );
        assert!(matches!(
            registration_role(&form(Some(Role::Admin), Some("mauvais")), &config),
            Err(AppError::Validation(_))
        ));
        // un mauvais code ne bloque pas une inscription ordinaire
        assert_eq!(
            registration_role(&form(Some(Role::Conducteur), Some("mauvais")), &config).unwrap(),
            Role::Conducteur
        );
    }
}
