use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub const RESERVATION_COLUMNS: &str =
    "r.id, r.trip_id, r.traveler_id, r.seats, r.message, r.statut, r.created_at, r.updated_at";

/// Statut d'une réservation. Seul `EnAttente` peut encore évoluer vers la décision du conducteur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    EnAttente,
    Confirmee,
    Rejetee,
    Annulee,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::EnAttente => "en_attente",
            ReservationStatus::Confirmee => "confirmee",
            ReservationStatus::Rejetee => "rejetee",
            ReservationStatus::Annulee => "annulee",
        }
    }

    /// Une réservation vivante bloque une nouvelle demande sur le même trajet
    pub fn is_live(&self) -> bool {
        matches!(self, ReservationStatus::EnAttente | ReservationStatus::Confirmee)
    }
}

impl TryFrom<String> for ReservationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "en_attente" => Ok(ReservationStatus::EnAttente),
            "confirmee" => Ok(ReservationStatus::Confirmee),
            "rejetee" => Ok(ReservationStatus::Rejetee),
            "annulee" => Ok(ReservationStatus::Annulee),
            other => Err(format!("statut de réservation inconnu : {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Reservation {
    pub id: i64,
    pub trip_id: i64,
    pub traveler_id: i64,
    pub seats: i32,
    pub message: Option<String>,
    #[sqlx(try_from = "String")]
    pub statut: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReservationForm {
    #[validate(range(min = 1, max = 8, message = "Le nombre de places doit être compris entre 1 et 8"))]
    pub seats: i32,
    #[validate(length(max = 500, message = "Le message est trop long"))]
    pub message: Option<String>,
}

/// Réservation reçue par un conducteur, avec les coordonnées du voyageur
#[derive(Debug, Serialize, FromRow)]
pub struct IncomingReservation {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reservation: Reservation,
    pub traveler_name: String,
    pub traveler_phone: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
}

/// Réservation d'un voyageur, avec le résumé du trajet
#[derive(Debug, Serialize, FromRow)]
pub struct OutgoingReservation {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reservation: Reservation,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub price: f64,
    pub driver_name: String,
}

/// Vue admin : réservation, voyageur et trajet
#[derive(Debug, Serialize, FromRow)]
pub struct ReservationOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reservation: Reservation,
    pub traveler_name: String,
    pub origin: String,
    pub destination: String,
    pub driver_name: String,
}
