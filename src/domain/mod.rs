//! Règles métier pures, sans accès à la base.

pub mod booking;
pub mod verification;
