use std::collections::BTreeMap;

use actix_web::{delete, get, put, web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{info, warn};
use validator::Validate;

use crate::domain::verification::{self, VerificationStatus};
use crate::error::{is_unique_violation, AppError};
use crate::models::reservation::{ReservationOverview, ReservationStatus, RESERVATION_COLUMNS};
use crate::models::role::AccountStatus;
use crate::models::trip::{StatusQuery, TripListing, TripStatus};
use crate::models::user::{AdminUpdateUserForm, User, UserListQuery, UserView, USER_COLUMNS};
use crate::models::vehicle::VehicleWithOwner;
use crate::routes::auth::require_user;
use crate::routes::trips::{change_trip_status, listing_select, present, TripAction};
use crate::utils::extract_user::Session;
use crate::utils::validation::{is_blank, like_pattern, non_empty};

async fn grouped_counts(pool: &MySqlPool, sql: &str) -> Result<BTreeMap<String, i64>, AppError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

/// Indicateurs du tableau de bord d'administration
#[get("/dashboard")]
async fn dashboard(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let pool = pool.get_ref();

    let users_by_role = grouped_counts(pool, "SELECT role, COUNT(*) FROM users GROUP BY role").await?;
    let reservations_by_status =
        grouped_counts(pool, "SELECT statut, COUNT(*) FROM reservations GROUP BY statut").await?;

    // un départ passé compte comme terminé, comme dans les listes
    let trips_by_status: BTreeMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
        "SELECT CASE WHEN departure_at <= ? THEN 'termine' ELSE statut END AS etat, COUNT(*) \
         FROM trips GROUP BY etat",
    )
    .bind(Utc::now())
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let blocked_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE statut = 'bloque'")
        .fetch_one(pool)
        .await?;
    let pending_verifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE statut_verification = 'en_attente' AND cin_path IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;
    let vehicles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vehicles")
        .fetch_one(pool)
        .await?;
    let seats_booked: i64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(seats), 0) AS SIGNED) FROM reservations WHERE statut = 'confirmee'",
    )
    .fetch_one(pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "users_by_role": users_by_role,
        "blocked_users": blocked_users,
        "pending_verifications": pending_verifications,
        "vehicles": vehicles,
        "trips_by_status": trips_by_status,
        "reservations_by_status": reservations_by_status,
        "seats_booked": seats_booked,
    })))
}

/// Route pour obtenir la liste des utilisateurs, avec filtres
#[get("/users")]
async fn list_users(
    pool: web::Data<MySqlPool>,
    session: Session,
    query: web::Query<UserListQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;

    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1"));
    if let Some(role) = query.role {
        qb.push(" AND role = ");
        qb.push_bind(role.as_str());
    }
    if let Some(statut) = query.statut {
        qb.push(" AND statut = ");
        qb.push_bind(statut.as_str());
    }
    if let Some(q) = non_empty(query.q.as_deref()) {
        let pattern = like_pattern(&q);
        qb.push(" AND (LOWER(name) LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR LOWER(email) LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
    qb.push(" ORDER BY created_at DESC");

    let users: Vec<UserView> = qb
        .build_query_as::<User>()
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .map(UserView::from)
        .collect();

    Ok(HttpResponse::Ok().json(users))
}

/// Mise à jour d'un compte, y compris blocage et déblocage
#[put("/users/{id}")]
async fn update_user(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<AdminUpdateUserForm>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    form.validate()?;
    let user_id = path.into_inner();

    if user_id == session.user_id {
        let demoted = form.role.is_some_and(|role| role != session.role);
        let blocked = form.statut == Some(AccountStatus::Bloque);
        if demoted || blocked {
            return Err(AppError::conflict("Vous ne pouvez pas bloquer ou rétrograder votre propre compte"));
        }
    }
    let before = require_user(pool.get_ref(), user_id).await?;

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email), \
         phone = IF(?, NULL, COALESCE(?, phone)), role = COALESCE(?, role), \
         statut = COALESCE(?, statut) WHERE id = ?",
    )
    .bind(non_empty(form.name.as_deref()))
    .bind(non_empty(form.email.as_deref()))
    .bind(is_blank(form.phone.as_deref()))
    .bind(non_empty(form.phone.as_deref()))
    .bind(form.role.map(|r| r.as_str()))
    .bind(form.statut.map(|s| s.as_str()))
    .bind(user_id)
    .execute(pool.get_ref())
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::field("email", "Email déjà utilisé")
        } else {
            AppError::Database(err)
        }
    })?;

    let user = require_user(pool.get_ref(), user_id).await?;
    if before.statut != user.statut {
        warn!(user_id, by = session.user_id, statut = user.statut.as_str(), "statut de compte modifié");
    }
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

/// Suppression d'un compte sans aucune donnée rattachée
#[delete("/users/{id}")]
async fn delete_user(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let user_id = path.into_inner();
    if user_id == session.user_id {
        return Err(AppError::conflict("Vous ne pouvez pas supprimer votre propre compte"));
    }
    require_user(pool.get_ref(), user_id).await?;

    let linked: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM trips WHERE driver_id = ?) \
         + (SELECT COUNT(*) FROM vehicles WHERE user_id = ?) \
         + (SELECT COUNT(*) FROM reservations WHERE traveler_id = ?)",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;
    if linked > 0 {
        return Err(AppError::conflict(
            "Cet utilisateur possède des trajets, un véhicule ou des réservations : bloquez-le plutôt",
        ));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;
    info!(user_id, by = session.user_id, "utilisateur supprimé");

    Ok(HttpResponse::Ok().json(json!({ "message": "Utilisateur supprimé avec succès" })))
}

/// File des documents d'identité à examiner
#[get("/verifications")]
async fn verification_queue(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    session.require_admin()?;

    let users: Vec<UserView> = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE statut_verification = 'en_attente' AND cin_path IS NOT NULL ORDER BY created_at ASC"
    ))
    .fetch_all(pool.get_ref())
    .await?
    .into_iter()
    .filter(|u| verification::in_review_queue(u.statut_verification, u.cin_path.as_deref()))
    .map(UserView::from)
    .collect();

    Ok(HttpResponse::Ok().json(users))
}

#[derive(Debug, Clone, Copy)]
enum Decision {
    Accept,
    Reject,
}

async fn decide_verification(
    pool: &MySqlPool,
    session: &Session,
    user_id: i64,
    decision: Decision,
) -> Result<User, AppError> {
    session.require_admin()?;

    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? FOR UPDATE"))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Utilisateur introuvable"))?;

    let status: VerificationStatus = match decision {
        Decision::Accept => verification::accept(user.statut_verification, user.cin_path.as_deref())?,
        Decision::Reject => verification::reject(user.statut_verification)?,
    };

    sqlx::query("UPDATE users SET statut_verification = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(user_id, by = session.user_id, statut = status.as_str(), "vérification d'identité décidée");

    require_user(pool, user_id).await
}

#[put("/users/{id}/verification/accept")]
async fn accept_verification(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let user = decide_verification(pool.get_ref(), &session, path.into_inner(), Decision::Accept).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

#[put("/users/{id}/verification/reject")]
async fn reject_verification(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let user = decide_verification(pool.get_ref(), &session, path.into_inner(), Decision::Reject).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

/// Tous les trajets ; `termine` filtre sur la date de départ
#[get("/trips")]
async fn list_trips(
    pool: web::Data<MySqlPool>,
    session: Session,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let now = Utc::now();

    let mut qb = QueryBuilder::<MySql>::new(listing_select());
    if let Some(raw) = non_empty(query.statut.as_deref()) {
        let statut = TripStatus::try_from(raw).map_err(|e| AppError::field("statut", e))?;
        if statut == TripStatus::Termine {
            qb.push(" WHERE t.departure_at <= ");
            qb.push_bind(now);
        } else {
            qb.push(" WHERE t.departure_at > ");
            qb.push_bind(now);
            qb.push(" AND t.statut = ");
            qb.push_bind(statut.as_str());
        }
    }
    qb.push(" ORDER BY t.departure_at DESC");

    let trips: Vec<TripListing> = qb
        .build_query_as::<TripListing>()
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .map(present)
        .collect();

    Ok(HttpResponse::Ok().json(trips))
}

#[put("/trips/{id}/cancel")]
async fn cancel_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let trip = change_trip_status(pool.get_ref(), &session, path.into_inner(), TripAction::Cancel).await?;
    Ok(HttpResponse::Ok().json(trip))
}

#[put("/trips/{id}/reactivate")]
async fn reactivate_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let trip = change_trip_status(pool.get_ref(), &session, path.into_inner(), TripAction::Reactivate).await?;
    Ok(HttpResponse::Ok().json(trip))
}

#[get("/vehicles")]
async fn list_vehicles(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    session.require_admin()?;

    let vehicles = sqlx::query_as::<_, VehicleWithOwner>(
        "SELECT v.id, v.user_id, v.make, v.model, v.color, v.year, v.seats, v.description, v.created_at, \
         u.name AS owner_name, u.email AS owner_email \
         FROM vehicles v JOIN users u ON u.id = v.user_id ORDER BY v.created_at DESC",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(vehicles))
}

#[get("/reservations")]
async fn list_reservations(
    pool: web::Data<MySqlPool>,
    session: Session,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;

    let mut qb = QueryBuilder::<MySql>::new(format!(
        "SELECT {RESERVATION_COLUMNS}, u.name AS traveler_name, t.origin, t.destination, \
         d.name AS driver_name \
         FROM reservations r \
         JOIN trips t ON t.id = r.trip_id \
         JOIN users u ON u.id = r.traveler_id \
         JOIN users d ON d.id = t.driver_id"
    ));
    if let Some(raw) = non_empty(query.statut.as_deref()) {
        let statut = ReservationStatus::try_from(raw).map_err(|e| AppError::field("statut", e))?;
        qb.push(" WHERE r.statut = ");
        qb.push_bind(statut.as_str());
    }
    qb.push(" ORDER BY r.created_at DESC");

    let reservations = qb
        .build_query_as::<ReservationOverview>()
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(reservations))
}

/// Configuration des routes spécifiques aux administrateurs
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard);
    cfg.service(list_users);
    cfg.service(update_user);
    cfg.service(delete_user);
    cfg.service(verification_queue);
    cfg.service(accept_verification);
    cfg.service(reject_verification);
    cfg.service(list_trips);
    cfg.service(cancel_trip);
    cfg.service(reactivate_trip);
    cfg.service(list_vehicles);
    cfg.service(list_reservations);
}
