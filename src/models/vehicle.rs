use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub const VEHICLE_COLUMNS: &str = "id, user_id, make, model, color, year, seats, description, created_at";

/// Véhicule d'un conducteur (un seul par conducteur)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vehicle {
    pub id: i64,
    pub user_id: i64,
    pub make: String,
    pub model: String,
    pub color: String,
    pub year: i32,
    pub seats: i32,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Création ou remplacement complet du véhicule
#[derive(Debug, Deserialize, Validate)]
pub struct VehicleForm {
    #[validate(length(min = 2, max = 100, message = "La marque est obligatoire"))]
    pub make: String,
    #[validate(length(min = 1, max = 100, message = "Le modèle est obligatoire"))]
    pub model: String,
    #[validate(length(min = 2, max = 50, message = "La couleur est obligatoire"))]
    pub color: String,
    #[validate(range(min = 1990, message = "L'année doit être postérieure à 1990"))]
    pub year: i32,
    #[validate(range(min = 1, max = 8, message = "Le nombre de places doit être compris entre 1 et 8"))]
    pub seats: i32,
    #[validate(length(max = 1000, message = "La description est trop longue"))]
    pub description: Option<String>,
}

/// Liste admin : véhicule et nom du propriétaire
#[derive(Debug, Serialize, FromRow)]
pub struct VehicleWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub owner_name: String,
    pub owner_email: String,
}
