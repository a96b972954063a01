//! Store gateway — every Postgres read and write goes through here.
//! No other crate opens a connection to the backing store; the durable
//! task runtime borrows this pool.

pub mod error;

mod device_auth;
mod links;
mod probes;
mod relations;
mod search;
mod users;

pub use device_auth::DeviceAuthRequest;
pub use error::{Result, StoreError};
pub use links::{Link, LinkFields, LinkSummaryRow};
pub use probes::{ProbeDevice, ProbeEvent};
pub use search::score_from_distance;
pub use users::User;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct LinkStore {
    pool: PgPool,
}

impl LinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The shared connection pool. The task runtime runs on this pool
    /// rather than opening its own.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
