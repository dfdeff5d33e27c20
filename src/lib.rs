//! API REST de la plateforme de covoiturage : trajets, réservations,
//! véhicules, vérification d'identité et administration.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod models;
pub mod routes;
pub mod utils;
