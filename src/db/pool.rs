use std::{path::Path, str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::DbPool;

/// Opens the target database read-only. The file must already exist;
/// write statements fail at the connection level.
pub async fn init_pool(db_path: impl AsRef<Path>) -> Result<DbPool, sqlx::Error> {
    let db_url = format!("sqlite://{}", db_path.as_ref().to_string_lossy());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(false)
        .read_only(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
