use anyhow::Result;
use deadpool::managed::{self, Pool, RecycleError, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};
use tracing::debug;

const MAX_CONNECTIONS: usize = 8;

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        // Several pooled connections share one file
        conn.query("PRAGMA busy_timeout = 5000", ()).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let mut rows = conn.query("SELECT 1", ()).await?;
        match rows.next().await? {
            Some(_) => Ok(()),
            None => Err(RecycleError::Message("connection returned no rows on ping".into())),
        }
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) a local database file and wrap it in a pool
pub async fn open_pool(path: &str) -> Result<LibsqlPool> {
    debug!(path = %path, "Opening database");
    let database = libsql::Builder::new_local(path).build().await?;
    let pool = Pool::builder(LibsqlManager::new(database)).max_size(MAX_CONNECTIONS).build()?;
    Ok(pool)
}
