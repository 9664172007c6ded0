//! Read/write pool routing for the PostgreSQL backend.
//!
//! Slot writes, `get_slot` and course lookups made on the write path go to
//! [`PoolProvider::write`]. Slot queries and course listings, which feed the
//! matrix and the sweeps and can tolerate replication lag, go to
//! [`PoolProvider::read`].

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

/// Trait for providing database pools with read/write routing.
///
/// Implementations can provide a separate replica for reads, or use a
/// single pool for both.
///
/// # Example
///
/// ```ignore
/// use teesheet::PoolProvider;
/// use sqlx::PgPool;
///
/// #[derive(Clone)]
/// struct MyPools {
///     primary: PgPool,
///     replica: Option<PgPool>,
/// }
///
/// impl PoolProvider for MyPools {
///     fn read(&self) -> &PgPool {
///         self.replica.as_ref().unwrap_or(&self.primary)
///     }
///
///     fn write(&self) -> &PgPool {
///         &self.primary
///     }
/// }
/// ```
pub trait PoolProvider: Clone + Send + Sync + 'static {
    /// Pool for reads that may lag the primary.
    fn read(&self) -> &PgPool;

    /// Pool for writes, transactions and reads that must see the latest
    /// committed state.
    fn write(&self) -> &PgPool;
}

/// A single pool serves both reads and writes.
impl PoolProvider for PgPool {
    fn read(&self) -> &PgPool {
        self
    }

    fn write(&self) -> &PgPool {
        self
    }
}

/// Test pool provider with a read-only replica.
///
/// Both pools reach the same database. Replica sessions start with
/// `default_transaction_read_only = on`, so a slot write routed through
/// `.read()` fails with "cannot execute ... in a read-only transaction".
#[derive(Clone, Debug)]
pub struct TestDbPools {
    primary: PgPool,
    replica: PgPool,
}

/// Application name replica sessions report in `pg_stat_activity`.
pub const REPLICA_APPLICATION_NAME: &str = "teesheet-replica";

impl TestDbPools {
    pub async fn new(pool: PgPool) -> Result<Self, sqlx::Error> {
        let replica_options: PgConnectOptions = pool
            .connect_options()
            .as_ref()
            .clone()
            .application_name(REPLICA_APPLICATION_NAME)
            .options([("default_transaction_read_only", "on")]);

        let replica = PgPoolOptions::new()
            .max_connections(pool.options().get_max_connections())
            .connect_with(replica_options)
            .await?;

        Ok(Self {
            primary: pool,
            replica,
        })
    }
}

impl PoolProvider for TestDbPools {
    fn read(&self) -> &PgPool {
        &self.replica
    }

    fn write(&self) -> &PgPool {
        &self.primary
    }
}
