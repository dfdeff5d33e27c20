use actix_web::{get, put, web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, warn};

use crate::domain::booking;
use crate::error::AppError;
use crate::models::reservation::{
    IncomingReservation, OutgoingReservation, Reservation, ReservationStatus, RESERVATION_COLUMNS,
};
use crate::routes::trips::lock_trip;
use crate::utils::extract_user::Session;

async fn find_reservation(pool: &MySqlPool, reservation_id: i64) -> Result<Reservation, AppError> {
    sqlx::query_as::<_, Reservation>(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.id = ?"
    ))
    .bind(reservation_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Réservation introuvable"))
}

async fn lock_reservation(conn: &mut MySqlConnection, reservation_id: i64) -> Result<Reservation, AppError> {
    sqlx::query_as::<_, Reservation>(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.id = ? FOR UPDATE"
    ))
    .bind(reservation_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Réservation introuvable"))
}

/// Passe une réservation d'un statut à un autre, seulement si elle n'a pas bougé entre-temps
async fn set_reservation_status(
    conn: &mut MySqlConnection,
    reservation_id: i64,
    from: ReservationStatus,
    to: ReservationStatus,
) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE reservations SET statut = ? WHERE id = ? AND statut = ?")
        .bind(to.as_str())
        .bind(reservation_id)
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(AppError::conflict("Cette réservation a déjà été traitée"));
    }
    Ok(())
}

/// Acceptation : les places sont engagées ici, sous verrou du trajet
#[put("/reservations/{id}/accept")]
async fn accept_reservation(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let reservation_id = path.into_inner();
    let trip_id = find_reservation(pool.get_ref(), reservation_id).await?.trip_id;

    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;
    let reservation = lock_reservation(&mut tx, reservation_id).await?;
    let change = booking::accept_reservation(&reservation, &trip, &session, Utc::now())?;

    // garde-fou côté base : jamais de places négatives
    let updated = sqlx::query(
        "UPDATE trips SET seats_remaining = seats_remaining - ?, statut = ? \
         WHERE id = ? AND seats_remaining >= ?",
    )
    .bind(reservation.seats)
    .bind(change.trip_status.as_str())
    .bind(trip.id)
    .bind(reservation.seats)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() != 1 {
        warn!(reservation_id, trip_id, "acceptation refusée : places insuffisantes");
        return Err(AppError::conflict("Places insuffisantes sur ce trajet"));
    }

    set_reservation_status(
        &mut tx,
        reservation_id,
        ReservationStatus::EnAttente,
        ReservationStatus::Confirmee,
    )
    .await?;
    tx.commit().await?;
    info!(
        reservation_id,
        trip_id,
        seats = reservation.seats,
        seats_remaining = change.seats_remaining,
        "réservation acceptée"
    );

    let reservation = find_reservation(pool.get_ref(), reservation_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "reservation": reservation,
        "seats_remaining": change.seats_remaining,
        "trip_statut": change.trip_status,
    })))
}

#[put("/reservations/{id}/reject")]
async fn reject_reservation(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let reservation_id = path.into_inner();
    let trip_id = find_reservation(pool.get_ref(), reservation_id).await?.trip_id;

    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;
    let reservation = lock_reservation(&mut tx, reservation_id).await?;
    booking::reject_reservation(&reservation, &trip, &session)?;

    set_reservation_status(
        &mut tx,
        reservation_id,
        ReservationStatus::EnAttente,
        ReservationStatus::Rejetee,
    )
    .await?;
    tx.commit().await?;
    info!(reservation_id, trip_id, "réservation refusée");

    let reservation = find_reservation(pool.get_ref(), reservation_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "reservation": reservation })))
}

/// Annulation par le voyageur lui-même
#[put("/reservations/{id}/cancel")]
async fn cancel_reservation(
    pool: web::Data<MySqlPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let reservation_id = path.into_inner();
    let trip_id = find_reservation(pool.get_ref(), reservation_id).await?.trip_id;

    let mut tx = pool.begin().await?;
    let trip = lock_trip(&mut tx, trip_id).await?;
    let reservation = lock_reservation(&mut tx, reservation_id).await?;
    let release = booking::cancel_reservation(&reservation, &trip, &session, Utc::now())?;

    if let Some(change) = release {
        sqlx::query("UPDATE trips SET seats_remaining = ?, statut = ? WHERE id = ?")
            .bind(change.seats_remaining)
            .bind(change.trip_status.as_str())
            .bind(trip.id)
            .execute(&mut *tx)
            .await?;
    }
    set_reservation_status(&mut tx, reservation_id, reservation.statut, ReservationStatus::Annulee).await?;
    tx.commit().await?;
    info!(reservation_id, trip_id, released = release.is_some(), "réservation annulée");

    let reservation = find_reservation(pool.get_ref(), reservation_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "reservation": reservation })))
}

/// Demandes reçues sur les trajets du conducteur connecté
#[get("/my-trips-reservations")]
async fn my_trips_reservations(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    let reservations = sqlx::query_as::<_, IncomingReservation>(&format!(
        "SELECT {RESERVATION_COLUMNS}, u.name AS traveler_name, u.phone AS traveler_phone, \
         t.origin, t.destination, t.departure_at \
         FROM reservations r \
         JOIN trips t ON t.id = r.trip_id \
         JOIN users u ON u.id = r.traveler_id \
         WHERE t.driver_id = ? ORDER BY r.created_at DESC"
    ))
    .bind(session.user_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(reservations))
}

/// Réservations du voyageur connecté
#[get("/my-reservations")]
async fn my_reservations(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    let reservations = sqlx::query_as::<_, OutgoingReservation>(&format!(
        "SELECT {RESERVATION_COLUMNS}, t.origin, t.destination, t.departure_at, t.price, \
         d.name AS driver_name \
         FROM reservations r \
         JOIN trips t ON t.id = r.trip_id \
         JOIN users d ON d.id = t.driver_id \
         WHERE r.traveler_id = ? ORDER BY t.departure_at DESC"
    ))
    .bind(session.user_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(reservations))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(accept_reservation);
    cfg.service(reject_reservation);
    cfg.service(cancel_reservation);
    cfg.service(my_trips_reservations);
    cfg.service(my_reservations);
}
