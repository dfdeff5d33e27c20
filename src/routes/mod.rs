use actix_cors::Cors;
use actix_web::{http, web};

use crate::config::Config;
use crate::error::AppError;

pub mod admin;
pub mod auth;
pub mod profile;
pub mod reservations;
pub mod stats;
pub mod trips;
pub mod vehicles;

/// Politique CORS du frontend React
pub fn cors(config: &Config) -> Cors {
    Cors::default()
        .allowed_origin(&config.cors_origin)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .max_age(3600)
}

/// Enregistre toutes les routes de l'API
pub fn config(cfg: &mut web::ServiceConfig) {
    // Corps ou paramètres illisibles : même format d'erreur que la validation
    cfg.app_data(
        web::JsonConfig::default()
            .limit(64 * 1024)
            .error_handler(|err, _req| AppError::field("body", err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::field("query", err.to_string()).into()),
    );

    cfg.configure(auth::config)
        .configure(profile::config)
        .configure(vehicles::config)
        .configure(trips::config)
        .configure(reservations::config)
        .configure(stats::config)
        .service(
            web::scope("/admin") // Préfixe pour toutes les routes d'administration
                .configure(admin::config),
        );
}
