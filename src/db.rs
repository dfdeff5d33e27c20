use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::info;

use crate::config::Config;

/// Initialise le pool de connexions à la base de données
pub async fn init_pool(config: &Config) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
}

/// Applique les migrations du dossier `migrations/`
pub async fn run_migrations(pool: &MySqlPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations appliquées");
    Ok(())
}
