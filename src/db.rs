use rocket_db_pools::sqlx::{self, PgPool};
use rocket_db_pools::Database;

/// Embedded schema migrations under `migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Primary Postgres pool, configured under `databases.tracker_db`.
#[derive(Database)]
#[database("tracker_db")]
pub struct TrackerDb(PgPool);

/// Apply every pending migration. Runs at ignition before any request is
/// served.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
