use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, MySqlPool};

use crate::error::AppError;

/// Chiffres publics affichés sur la page d'accueil
#[derive(Debug, Serialize, FromRow)]
pub struct PublicStats {
    pub open_trips: i64,
    pub drivers: i64,
    pub travelers: i64,
    pub confirmed_reservations: i64,
}

#[get("/stats")]
async fn public_stats(pool: web::Data<MySqlPool>) -> Result<HttpResponse, AppError> {
    let stats = sqlx::query_as::<_, PublicStats>(
        "SELECT \
         (SELECT COUNT(*) FROM trips WHERE statut = 'actif' AND departure_at > ?) AS open_trips, \
         (SELECT COUNT(*) FROM users WHERE role = 'conducteur' AND statut = 'actif') AS drivers, \
         (SELECT COUNT(*) FROM users WHERE role = 'voyageur' AND statut = 'actif') AS travelers, \
         (SELECT COUNT(*) FROM reservations WHERE statut = 'confirmee') AS confirmed_reservations",
    )
    .bind(Utc::now())
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(stats))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(public_stats);
}
