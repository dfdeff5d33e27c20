use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};
use tracing::info;
use validator::Validate;

use crate::config::Config;
use crate::domain::booking;
use crate::error::AppError;
use crate::models::reservation::{Reservation, ReservationForm, ReservationStatus, RESERVATION_COLUMNS};
use crate::models::trip::{
    CreateTripForm, Trip, TripListing, TripSearchQuery, TripStatus, UpdateTripForm, TRIP_COLUMNS,
};
use crate::routes::vehicles::find_vehicle_of;
use crate::utils::extract_user::Session;
use crate::utils::validation::{like_pattern, non_empty};

/// Sélection commune des trajets joints à leur conducteur
pub(crate) fn listing_select() -> String {
    format!(
        "SELECT {TRIP_COLUMNS}, u.name AS driver_name, u.photo_path AS driver_photo, \
         u.statut_verification AS driver_verification \
         FROM trips t JOIN users u ON u.id = t.driver_id"
    )
}

/// Statut affiché et badge du conducteur, calculés à la lecture
pub(crate) fn present(listing: TripListing) -> TripListing {
    let mut listing = listing.with_badge();
    listing.trip.statut = booking::effective_status(&listing.trip, Utc::now());
    listing
}

pub(crate) async fn find_trip(pool: &MySqlPool, trip_id: i64) -> Result<Trip, AppError> {
    sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trips t WHERE t.id = ?"))
        .bind(trip_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Trajet introuvable"))
}

/// Verrouille la ligne du trajet jusqu'à la fin de la transaction.
/// Ordre de verrouillage : trajet puis réservation.
pub(crate) async fn lock_trip(conn: &mut MySqlConnection, trip_id: i64) -> Result<Trip, AppError> {
    sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trips t WHERE t.id = ? FOR UPDATE"))
        .bind(trip_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Trajet introuvable"))
}

/// Action de statut demandée par un conducteur ou un administrateur
#[derive(Debug, Clone, Copy)]
pub(crate) enum TripAction {
    Cancel,
    Reactivate,
}

pub(crate) async fn change_trip_status(
    pool: &MySqlPool,
    session: &Session,
    trip_id: i64,
    action: TripAction,
) -> Result<Trip, AppError> {
    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;

    let statut = match action {
        TripAction::Cancel => booking::cancel_trip(&trip, session)?,
        TripAction::Reactivate => booking::reactivate_trip(&trip, session, Utc::now())?,
    };

    sqlx::query("UPDATE trips SET statut = ? WHERE id = ?")
        .bind(statut.as_str())
        .bind(trip_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(trip_id, by = session.user_id, statut = statut.as_str(), "statut du trajet modifié");

    find_trip(pool, trip_id).await
}

/// Recherche publique des trajets ouverts
#[get("/trips")]
async fn search_trips(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<TripSearchQuery>,
) -> Result<HttpResponse, AppError> {
    let mut qb = QueryBuilder::<MySql>::new(listing_select());
    qb.push(" WHERE t.statut = 'actif' AND t.departure_at > ");
    qb.push_bind(Utc::now());

    if let Some(origin) = non_empty(query.origin.as_deref()) {
        qb.push(" AND LOWER(t.origin) LIKE ");
        qb.push_bind(like_pattern(&origin));
    }
    if let Some(destination) = non_empty(query.destination.as_deref()) {
        qb.push(" AND LOWER(t.destination) LIKE ");
        qb.push_bind(like_pattern(&destination));
    }
    if let Some(date) = query.date {
        let (start, end) = booking::local_day_bounds(date, config.local_offset);
        qb.push(" AND t.departure_at >= ");
        qb.push_bind(start);
        qb.push(" AND t.departure_at < ");
        qb.push_bind(end);
    }
    qb.push(" AND t.seats_remaining >= ");
    qb.push_bind(query.seats.unwrap_or(1).max(1));
    qb.push(" ORDER BY t.departure_at ASC LIMIT 100");

    let trips: Vec<TripListing> = qb
        .build_query_as::<TripListing>()
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .map(present)
        .collect();

    Ok(HttpResponse::Ok().json(trips))
}

#[get("/trips/{id}")]
async fn trip_detail(pool: web::Data<MySqlPool>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let trip_id = path.into_inner();
    let listing = sqlx::query_as::<_, TripListing>(&format!("{} WHERE t.id = ?", listing_select()))
        .bind(trip_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Trajet introuvable"))?;
    let vehicle = find_vehicle_of(pool.get_ref(), listing.trip.driver_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "trip": present(listing),
        "vehicle": vehicle,
    })))
}

/// Publication d'un trajet par un conducteur disposant d'un véhicule
#[post("/trips")]
async fn create_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    form: web::Json<CreateTripForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;
    let vehicle = find_vehicle_of(pool.get_ref(), session.user_id).await?;
    booking::check_trip_creation(&session, vehicle.as_ref(), &form, Utc::now())?;

    let result = sqlx::query(
        "INSERT INTO trips (driver_id, origin, destination, departure_at, price, seats_total, \
         seats_remaining, statut, description) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session.user_id)
    .bind(form.origin.trim())
    .bind(form.destination.trim())
    .bind(form.departure_at)
    .bind(form.price)
    .bind(form.seats_total)
    .bind(form.seats_total)
    .bind(TripStatus::Actif.as_str())
    .bind(non_empty(form.description.as_deref()))
    .execute(pool.get_ref())
    .await?;

    let trip = find_trip(pool.get_ref(), result.last_insert_id() as i64).await?;
    info!(trip_id = trip.id, driver_id = session.user_id, "trajet publié");
    Ok(HttpResponse::Created().json(trip))
}

#[put("/trips/{id}")]
async fn update_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<UpdateTripForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;
    let trip_id = path.into_inner();
    let vehicle_seats = find_vehicle_of(pool.get_ref(), session.user_id)
        .await?
        .map(|v| v.seats);

    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;
    let update = booking::plan_trip_update(&trip, &session, &form, vehicle_seats, Utc::now())?;

    sqlx::query(
        "UPDATE trips SET origin = ?, destination = ?, departure_at = ?, price = ?, seats_total = ?, \
         seats_remaining = ?, statut = ?, description = ? WHERE id = ?",
    )
    .bind(update.origin.trim())
    .bind(update.destination.trim())
    .bind(update.departure_at)
    .bind(update.price)
    .bind(update.seats_total)
    .bind(update.seats_remaining)
    .bind(update.statut.as_str())
    .bind(non_empty(update.description.as_deref()))
    .bind(trip_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let trip = find_trip(pool.get_ref(), trip_id).await?;
    Ok(HttpResponse::Ok().json(trip))
}

#[delete("/trips/{id}")]
async fn delete_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let trip_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;
    booking::check_trip_deletion(&trip, &session)?;

    // les réservations suivent par ON DELETE CASCADE
    sqlx::query("DELETE FROM trips WHERE id = ?")
        .bind(trip_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(trip_id, by = session.user_id, "trajet supprimé");

    Ok(HttpResponse::Ok().json(json!({ "message": "Trajet supprimé avec succès" })))
}

#[put("/trips/{id}/cancel")]
async fn cancel_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let trip = change_trip_status(pool.get_ref(), &session, path.into_inner(), TripAction::Cancel).await?;
    Ok(HttpResponse::Ok().json(trip))
}

#[put("/trips/{id}/reactivate")]
async fn reactivate_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let trip = change_trip_status(pool.get_ref(), &session, path.into_inner(), TripAction::Reactivate).await?;
    Ok(HttpResponse::Ok().json(trip))
}

/// Demande de réservation d'un voyageur ; les places restent libres jusqu'à acceptation
#[post("/trips/{id}/reserve")]
async fn reserve_trip(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<ReservationForm>,
) -> Result<HttpResponse, AppError> {
    form.validate()?;
    let trip_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;

    let previous: Vec<String> =
        sqlx::query_scalar("SELECT statut FROM reservations WHERE trip_id = ? AND traveler_id = ?")
            .bind(trip_id)
            .bind(session.user_id)
            .fetch_all(&mut *tx)
            .await?;
    let mut has_live = false;
    for statut in previous {
        has_live |= ReservationStatus::try_from(statut).map_err(AppError::Internal)?.is_live();
    }
    booking::check_new_reservation(&trip, &session, form.seats, has_live, Utc::now())?;

    let result = sqlx::query(
        "INSERT INTO reservations (trip_id, traveler_id, seats, message, statut) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(trip_id)
    .bind(session.user_id)
    .bind(form.seats)
    .bind(non_empty(form.message.as_deref()))
    .bind(ReservationStatus::EnAttente.as_str())
    .execute(&mut *tx)
    .await?;
    let reservation_id = result.last_insert_id() as i64;

    let reservation = sqlx::query_as::<_, Reservation>(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.id = ?"
    ))
    .bind(reservation_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    info!(reservation_id, trip_id, traveler_id = session.user_id, "demande de réservation");

    Ok(HttpResponse::Created().json(reservation))
}

/// Trajets publiés par le conducteur connecté
#[get("/my-trips")]
async fn my_trips(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let trips: Vec<Trip> = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips t WHERE t.driver_id = ? ORDER BY t.departure_at DESC"
    ))
    .bind(session.user_id)
    .fetch_all(pool.get_ref())
    .await?
    .into_iter()
    .map(|mut trip| {
        trip.statut = booking::effective_status(&trip, now);
        trip
    })
    .collect();

    Ok(HttpResponse::Ok().json(trips))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(search_trips);
    cfg.service(create_trip);
    cfg.service(trip_detail);
    cfg.service(update_trip);
    cfg.service(delete_trip);
    cfg.service(cancel_trip);
    cfg.service(reactivate_trip);
    cfg.service(reserve_trip);
    cfg.service(my_trips);
}
