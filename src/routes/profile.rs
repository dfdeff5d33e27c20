use actix_web::{delete, get, post, put, web, HttpResponse};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use validator::Validate;

use crate::config::Config;
use crate::domain::verification;
use crate::error::{is_unique_violation, AppError};
use crate::models::user::{ChangePasswordForm, IdentityDocumentForm, PhotoForm, UpdateProfileForm, UserView};
use crate::routes::auth::require_user;
use crate::routes::vehicles::find_vehicle_of;
use crate::utils::extract_user::Session;
use crate::utils::hash;
use crate::utils::validation::{is_blank, non_empty};

/// Profil complet : utilisateur et éventuel véhicule
#[get("/profile")]
async fn get_profile(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    let user = require_user(pool.get_ref(), session.user_id).await?;
    let vehicle = find_vehicle_of(pool.get_ref(), session.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "user": UserView::from(user),
        "vehicle": vehicle,
    })))
}

#[put("/profile")]
async fn update_profile(
    pool: web::Data<MySqlPool>,
    session: Session,
    form: web::Json<UpdateProfileForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;

    // absent : inchangé ; vide : effacé
    let clear_phone = is_blank(form.phone.as_deref());
    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email), \
         phone = IF(?, NULL, COALESCE(?, phone)) WHERE id = ?",
    )
    .bind(non_empty(form.name.as_deref()))
    .bind(non_empty(form.email.as_deref()))
    .bind(clear_phone)
    .bind(non_empty(form.phone.as_deref()))
    .bind(session.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::field("email", "Email déjà utilisé")
        } else {
            AppError::Database(err)
        }
    })?;

    let user = require_user(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

#[post("/profile/photo")]
async fn set_photo(
    pool: web::Data<MySqlPool>,
    session: Session,
    form: web::Json<PhotoForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;

    sqlx::query("UPDATE users SET photo_path = ? WHERE id = ?")
        .bind(form.photo_path.trim())
        .bind(session.user_id)
        .execute(pool.get_ref())
        .await?;

    let user = require_user(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

#[delete("/profile/photo")]
async fn remove_photo(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    sqlx::query("UPDATE users SET photo_path = NULL WHERE id = ?")
        .bind(session.user_id)
        .execute(pool.get_ref())
        .await?;

    let user = require_user(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

/// Dépôt du document d'identité : le dossier repasse en attente de vérification
#[post("/profile/identity-document")]
async fn submit_identity_document(
    pool: web::Data<MySqlPool>,
    session: Session,
    form: web::Json<IdentityDocumentForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;
    let status = verification::submit_document(&form.cin_path)?;

    sqlx::query("UPDATE users SET cin_path = ?, statut_verification = ? WHERE id = ?")
        .bind(form.cin_path.trim())
        .bind(status.as_str())
        .bind(session.user_id)
        .execute(pool.get_ref())
        .await?;
    info!(user_id = session.user_id, "document d'identité déposé");

    let user = require_user(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

#[put("/profile/password")]
async fn change_password(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    session: Session,
    form: web::Json<ChangePasswordForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;

    let user = require_user(pool.get_ref(), session.user_id).await?;
    if !hash::verify_password(&form.current_password, &user.password) {
        return Err(AppError::field("current_password", "Le mot de passe actuel est incorrect"));
    }

    let hashed_password = hash::hash_password(&form.password, config.bcrypt_cost)?;
    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed_password)
        .bind(session.user_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Mot de passe modifié avec succès" })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_profile);
    cfg.service(update_profile);
    cfg.service(set_photo);
    cfg.service(remove_photo);
    cfg.service(submit_identity_document);
    cfg.service(change_password);
}
