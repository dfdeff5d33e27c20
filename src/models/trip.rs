use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::domain::verification::VerificationStatus;

pub const TRIP_COLUMNS: &str = "t.id, t.driver_id, t.origin, t.destination, t.departure_at, t.price, \
                                t.seats_total, t.seats_remaining, t.statut, t.description, t.created_at";

/// Statut d'un trajet. `Termine` est informatif : il est calculé à la lecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Actif,
    Complet,
    Annule,
    Termine,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Actif => "actif",
            TripStatus::Complet => "complet",
            TripStatus::Annule => "annule",
            TripStatus::Termine => "termine",
        }
    }
}

impl TryFrom<String> for TripStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "actif" => Ok(TripStatus::Actif),
            "complet" => Ok(TripStatus::Complet),
            "annule" => Ok(TripStatus::Annule),
            "termine" => Ok(TripStatus::Termine),
            other => Err(format!("statut de trajet inconnu : {other}")),
        }
    }
}

/// Trajet publié par un conducteur
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trip {
    pub id: i64,
    pub driver_id: i64,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub price: f64,
    pub seats_total: i32,
    pub seats_remaining: i32,
    #[sqlx(try_from = "String")]
    pub statut: TripStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    /// Places déjà engagées par des réservations confirmées
    pub fn seats_confirmed(&self) -> i32 {
        self.seats_total - self.seats_remaining
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTripForm {
    #[validate(length(min = 2, max = 120, message = "La ville de départ est obligatoire"))]
    pub origin: String,
    #[validate(length(min = 2, max = 120, message = "La ville d'arrivée est obligatoire"))]
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    #[validate(range(exclusive_min = 0.0, max = 10000.0, message = "Le prix doit être positif"))]
    pub price: f64,
    #[validate(range(min = 1, max = 8, message = "Le nombre de places doit être compris entre 1 et 8"))]
    pub seats_total: i32,
    #[validate(length(max = 1000, message = "La description est trop longue"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTripForm {
    #[validate(length(min = 2, max = 120, message = "La ville de départ est obligatoire"))]
    pub origin: Option<String>,
    #[validate(length(min = 2, max = 120, message = "La ville d'arrivée est obligatoire"))]
    pub destination: Option<String>,
    pub departure_at: Option<DateTime<Utc>>,
    #[validate(range(exclusive_min = 0.0, max = 10000.0, message = "Le prix doit être positif"))]
    pub price: Option<f64>,
    #[validate(range(min = 1, max = 8, message = "Le nombre de places doit être compris entre 1 et 8"))]
    pub seats_total: Option<i32>,
    #[validate(length(max = 1000, message = "La description est trop longue"))]
    pub description: Option<String>,
}

/// Critères de recherche publique
#[derive(Debug, Default, Deserialize)]
pub struct TripSearchQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
    pub seats: Option<i32>,
}

/// Filtre admin par statut
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub statut: Option<String>,
}

/// Trajet accompagné de son conducteur, pour la recherche et le détail
#[derive(Debug, Serialize, FromRow)]
pub struct TripListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub trip: Trip,
    pub driver_name: String,
    pub driver_photo: Option<String>,
    #[sqlx(try_from = "String")]
    #[serde(skip)]
    pub driver_verification: VerificationStatus,
    #[sqlx(skip)]
    pub driver_badge_verifie: bool,
}

impl TripListing {
    pub fn with_badge(mut self) -> Self {
        self.driver_badge_verifie = self.driver_verification.badge_verifie();
        self
    }
}
