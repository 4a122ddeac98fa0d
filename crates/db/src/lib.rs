use anyhow::{Context, Result};
use futures_util::TryStreamExt;
use landed_core::{
    config::DbConfig,
    models::{Build, BuildMetrics, Change, Landing, PerfPoint},
};
use sqlx::{
    FromRow, Pool, QueryBuilder, Sqlite, SqliteConnection, migrate::MigrateDatabase,
    sqlite::SqlitePoolOptions,
};

#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Sqlite>,
}

#[derive(FromRow)]
struct ChangeRow {
    id: i64,
    changeset: String,
    pull_request: Option<i64>,
    time: i64,
}

impl TryFrom<ChangeRow> for Change {
    type Error = anyhow::Error;

    fn try_from(row: ChangeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            changeset: row.changeset,
            pull_request: row.pull_request.map(|pr| from_sql(pr, "pull request")).transpose()?,
            time: row.time,
        })
    }
}

#[derive(FromRow)]
struct BuildRow {
    change_id: i64,
    build_num: i64,
    plat: String,
    compile_time: Option<i64>,
    test_time: Option<i64>,
    build_slave: Option<String>,
}

impl TryFrom<BuildRow> for Build {
    type Error = anyhow::Error;

    fn try_from(row: BuildRow) -> Result<Self> {
        Ok(Self {
            change_id: row.change_id,
            build_num: from_sql(row.build_num, "build number")?,
            platform: row.plat,
            compile_time: row.compile_time,
            test_time: row.test_time,
            slave: row.build_slave,
        })
    }
}

fn to_sql(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{what} {value} does not fit the database"))
}

fn from_sql(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).with_context(|| format!("Invalid {what} {value} in database"))
}

#[derive(FromRow)]
struct PerfRow {
    time: i64,
    changeset: String,
    pull_request: Option<i64>,
    build_num: i64,
    compile_time: Option<i64>,
    test_time: Option<i64>,
}

impl Database {
    pub async fn new(config: &DbConfig) -> Result<Self> {
        if !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
            tracing::info!(url = %config.url, "Creating database");
            Sqlite::create_database(&config.url).await.context("Failed to create database")?;
            tracing::info!("Database created");
        }
        // A single writer; one connection also keeps in-memory databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    pub async fn close(&self) { self.pool.close().await }

    pub async fn change_exists(&self, changeset: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM change WHERE changeset = ?)")
                .bind(changeset)
                .fetch_one(&mut *conn)
                .await?;
        Ok(exists != 0)
    }

    /// Insert a landed changeset and its per-platform builds as one unit.
    /// Returns `None` without writing anything if the changeset is already stored.
    pub async fn insert_landing(
        &self,
        landing: &Landing,
        builds: &[BuildMetrics],
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let pull_request =
            landing.pull_request.map(|pr| to_sql(pr, "pull request")).transpose()?;
        let Some(change_id) = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO change (changeset, pull_request, time)
            VALUES (?, ?, ?)
            ON CONFLICT (changeset) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&landing.changeset)
        .bind(pull_request)
        .bind(landing.time)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert change {}", landing.changeset))?
        else {
            return Ok(None);
        };
        Self::insert_builds(&mut *tx, change_id, builds)
            .await
            .with_context(|| format!("Failed to insert builds for {}", landing.changeset))?;
        tx.commit().await?;
        Ok(Some(change_id))
    }

    async fn insert_builds(
        conn: &mut SqliteConnection,
        change_id: i64,
        builds: &[BuildMetrics],
    ) -> Result<()> {
        if builds.is_empty() {
            return Ok(());
        }
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO build (change_id, build_num, plat, compile_time, test_time, build_slave) ",
        );
        let build_nums = builds
            .iter()
            .map(|b| to_sql(b.build_num, "build number"))
            .collect::<Result<Vec<_>>>()?;
        builder.push_values(builds.iter().zip(build_nums), |mut b, (build, build_num)| {
            b.push_bind(change_id)
                .push_bind(build_num)
                .push_bind(&build.platform)
                .push_bind(build.compile_time)
                .push_bind(build.test_time)
                .push_bind(&build.slave);
        });
        builder.build().execute(conn).await?;
        Ok(())
    }

    pub async fn get_change(&self, changeset: &str) -> Result<Option<Change>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ChangeRow>(
            "SELECT id, changeset, pull_request, time FROM change WHERE changeset = ?",
        )
        .bind(changeset)
        .fetch_optional(&mut *conn)
        .await?;
        row.map(Change::try_from).transpose()
    }

    pub async fn get_builds(&self, change_id: i64) -> Result<Vec<Build>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT change_id, build_num, plat, compile_time, test_time, build_slave
            FROM build
            WHERE change_id = ?
            ORDER BY plat
            "#,
        )
        .bind(change_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(Build::try_from).collect()
    }

    /// Distinct platforms with stored builds. Unless `all` is set, only the
    /// main optimized builders and the old single-platform rows are returned.
    pub async fn get_platforms(&self, all: bool) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let query = if all {
            "SELECT DISTINCT plat FROM build ORDER BY plat"
        } else {
            r#"
            SELECT DISTINCT plat FROM build
            WHERE plat LIKE '%-32-opt' OR plat LIKE '%-64-opt' OR plat NOT LIKE '%-%'
            ORDER BY plat
            "#
        };
        Ok(sqlx::query_scalar(query).fetch_all(&mut *conn).await?)
    }

    /// Builds of one platform joined with their change, oldest first.
    pub async fn get_perf_points(
        &self,
        platform: &str,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<PerfPoint>> {
        let mut conn = self.pool.acquire().await?;
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT change.time, changeset, pull_request, build_num, compile_time, test_time
            FROM change INNER JOIN build ON change.id = build.change_id
            WHERE plat = "#,
        );
        builder.push_bind(platform);
        if let Some(since) = since {
            builder.push(" AND change.time >= ").push_bind(since);
        }
        builder.push(" ORDER BY change.time LIMIT ").push_bind(limit as i64);
        let mut points = Vec::new();
        let mut stream = builder.build_query_as::<PerfRow>().fetch(&mut *conn);
        while let Some(row) = stream.try_next().await? {
            points.push(PerfPoint {
                time: row.time,
                changeset: row.changeset,
                pull_request: row
                    .pull_request
                    .map(|pr| from_sql(pr, "pull request"))
                    .transpose()?,
                build_num: from_sql(row.build_num, "build number")?,
                compile_time: row.compile_time,
                test_time: row.test_time,
            });
        }
        Ok(points)
    }

    /// Changes that landed through a pull request since `since`, newest first.
    pub async fn get_landed_pulls(&self, since: i64, limit: u32) -> Result<Vec<Change>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, changeset, pull_request, time
            FROM change
            WHERE time >= ? AND pull_request IS NOT NULL
            ORDER BY time DESC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(Change::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        Database::new(&DbConfig { url: "sqlite::memory:".to_string() }).await.unwrap()
    }

    fn landing(changeset: &str, pull_request: Option<u64>, time: i64) -> Landing {
        Landing { changeset: changeset.to_string(), pull_request, time }
    }

    fn metrics(platform: &str, compile_time: Option<i64>, test_time: Option<i64>) -> BuildMetrics {
        BuildMetrics {
            platform: platform.to_string(),
            build_num: 7,
            compile_time,
            test_time,
            slave: Some("slave-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_landing() {
        let db = memory_db().await;
        assert!(!db.change_exists("abc123").await.unwrap());
        let builds = [metrics("p1", Some(10), Some(5)), metrics("p2", Some(12), None)];
        let id = db.insert_landing(&landing("abc123", Some(42), 100), &builds).await.unwrap();
        let id = id.expect("change inserted");
        assert!(db.change_exists("abc123").await.unwrap());

        let change = db.get_change("abc123").await.unwrap().unwrap();
        assert_eq!(change, Change {
            id,
            changeset: "abc123".to_string(),
            pull_request: Some(42),
            time: 100
        });
        let stored = db.get_builds(id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].platform, "p1");
        assert_eq!(stored[1].compile_time, Some(12));
        assert_eq!(stored[1].test_time, None);
        assert_eq!(stored[1].slave.as_deref(), Some("slave-1"));
    }

    #[tokio::test]
    async fn test_insert_landing_twice() {
        let db = memory_db().await;
        let builds = [metrics("p1", Some(10), Some(5))];
        assert!(db.insert_landing(&landing("abc123", None, 100), &builds).await.unwrap().is_some());
        assert!(db.insert_landing(&landing("abc123", None, 200), &builds).await.unwrap().is_none());
        let change = db.get_change("abc123").await.unwrap().unwrap();
        assert_eq!(change.time, 100);
        assert_eq!(db.get_builds(change.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_builds_roll_back_change() {
        let db = memory_db().await;
        // Duplicate platform violates UNIQUE (change_id, plat)
        let builds = [metrics("p1", Some(10), Some(5)), metrics("p1", Some(11), Some(6))];
        assert!(db.insert_landing(&landing("abc123", None, 100), &builds).await.is_err());
        assert!(!db.change_exists("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_out_of_range_numbers() {
        let db = memory_db().await;
        let builds = [metrics("p1", Some(10), Some(5))];
        assert!(db.insert_landing(&landing("big", Some(u64::MAX), 100), &builds).await.is_err());
        assert!(!db.change_exists("big").await.unwrap());

        let mut huge = metrics("p1", None, None);
        huge.build_num = u64::MAX;
        assert!(db.insert_landing(&landing("huge", None, 100), &[huge]).await.is_err());
        assert!(!db.change_exists("huge").await.unwrap());

        sqlx::query("INSERT INTO change (changeset, pull_request, time) VALUES ('neg', -1, 0)")
            .execute(&db.pool)
            .await
            .unwrap();
        assert!(db.get_change("neg").await.is_err());
    }

    #[tokio::test]
    async fn test_export_queries() {
        let db = memory_db().await;
        db.insert_landing(&landing("aaa", Some(1), 100), &[
            metrics("linux-64-opt", Some(10), Some(5)),
            metrics("linux-64-nopt-c", Some(20), Some(6)),
        ])
        .await
        .unwrap();
        db.insert_landing(&landing("bbb", None, 200), &[metrics("linux-64-opt", Some(11), None)])
            .await
            .unwrap();
        db.insert_landing(&landing("ccc", Some(3), 300), &[metrics("linux", Some(12), Some(7))])
            .await
            .unwrap();

        assert_eq!(db.get_platforms(false).await.unwrap(), vec!["linux", "linux-64-opt"]);
        assert_eq!(db.get_platforms(true).await.unwrap(), vec![
            "linux",
            "linux-64-nopt-c",
            "linux-64-opt"
        ]);

        let points = db.get_perf_points("linux-64-opt", None, 500).await.unwrap();
        assert_eq!(points.iter().map(|p| p.time).collect::<Vec<_>>(), vec![100, 200]);
        assert_eq!(points[0].pull_request, Some(1));
        assert_eq!(points[1].test_time, None);
        let points = db.get_perf_points("linux-64-opt", Some(150), 500).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].changeset, "bbb");

        let pulls = db.get_landed_pulls(0, 500).await.unwrap();
        assert_eq!(pulls.iter().map(|c| c.changeset.as_str()).collect::<Vec<_>>(), vec![
            "ccc", "aaa"
        ]);
        assert!(db.get_landed_pulls(150, 500).await.unwrap().iter().all(|c| c.time >= 150));
    }
}
