use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use covoiturage_api::config::Config;
use covoiturage_api::db::{init_pool, run_migrations};
use covoiturage_api::routes;
use covoiturage_api::utils::extract_user::ExtractUser;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Charger la configuration depuis .env
    let config = Config::from_env().map_err(anyhow::Error::msg)?;

    info!("Connexion à la base de données...");
    let pool = init_pool(&config)
        .await
        .context("Impossible de se connecter à la base de données")?;
    run_migrations(&pool).await.context("Échec des migrations")?;

    let bind_address = config.bind_address.clone();
    let config = web::Data::new(config);
    let pool = web::Data::new(pool);

    info!("Démarrage du serveur sur http://{}", bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone()) // Partager le pool de connexions avec les handlers
            .app_data(config.clone())
            .wrap(ExtractUser)
            .wrap(routes::cors(&config)) // Configuration de CORS
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
