use std::str::FromStr;
use std::sync::Arc;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::migrate::Migrator;
use crate::reconcile::{Reconciler, SharedReconciler};
use crate::store::SqliteClassStore;

// macro to store a closed enum as its short TEXT code
#[macro_export]
macro_rules! impl_sqlx_text_enum {
    ($type:ident) => {
        impl<DB: sqlx::Database> sqlx::Type<DB> for $type
        where str: sqlx::Type<DB>
        {
            fn type_info() -> <DB as sqlx::Database>::TypeInfo {
                // TEXT columns only
                <&str as sqlx::Type<DB>>::type_info()
            }
        }

        impl<'q, DB: sqlx::Database> sqlx::Encode<'q, DB> for $type
        where &'q str: sqlx::Encode<'q, DB>
        {
            fn encode_by_ref(&self, buf: &mut <DB as sqlx::Database>::ArgumentBuffer<'q>) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                let code: &'q str = self.code();
                <&'q str as sqlx::Encode<'q, DB>>::encode_by_ref(&code, buf)
            }
        }

        impl<'r, DB: sqlx::Database> sqlx::Decode<'r, DB> for $type
        where &'r str: sqlx::Decode<'r, DB>
        {
            fn decode(value: <DB as sqlx::Database>::ValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let value = <&str as sqlx::Decode<DB>>::decode(value)?;
                Ok(<$type as std::str::FromStr>::from_str(value)?)
            }
        }
    };
}

static MIGRATOR: Migrator = sqlx::migrate!("db/migrations");

pub async fn open_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(if in_memory { SqliteJournalMode::Memory } else { SqliteJournalMode::Wal });
    // every connection to sqlite::memory: is a fresh database, keep exactly one alive
    let pool_opts = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = pool_opts.connect_with(opts).await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

pub struct DbPoolFairing();
#[rocket::async_trait]
impl Fairing for DbPoolFairing {
    fn info(&self) -> Info {
        Info {
            name: "SQLite Database Pool with Migrations",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let database_url = if cfg!(test) {
            "sqlite::memory:".to_string()
        } else {
            match rocket.figment().extract_inner::<String>("database_url") {
                Ok(url) => url,
                Err(err) => {
                    error!("database_url not configured: {err}");
                    return Err(rocket);
                }
            }
        };

        info!("Opening database: {database_url}");
        let pool = match open_pool(&database_url).await {
            Ok(pool) => pool,
            Err(err) => {
                error!("Database open error: {:?}", err);
                return Err(rocket);
            }
        };
        info!("Migrations applied successfully!");

        let reconciler: SharedReconciler = Arc::new(Reconciler::new(Arc::new(SqliteClassStore::new(pool))));
        Ok(rocket.manage(reconciler))
    }
}
