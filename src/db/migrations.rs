use futures_util::future::BoxFuture;
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::DbError;

/// Schema version a fully migrated database reports.
pub const LATEST_VERSION: i64 = 3;

type Apply = fn(&mut SqliteConnection) -> BoxFuture<'_, Result<(), DbError>>;

struct Migration {
    version: i64,
    description: &'static str,
    apply: Apply,
}

/// Ordered migration ledger. Versions must be strictly increasing.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema",
        apply: initial_schema,
    },
    Migration {
        version: 2,
        description: "threaded comments",
        apply: threaded_comments,
    },
    Migration {
        version: 3,
        description: "comment indexes and thread guards",
        apply: thread_guards,
    },
];

/// Run all pending migrations, returning how many were applied.
///
/// Each migration and its version bump commit in one transaction. Foreign key
/// enforcement is switched off on the migrating connection while pending
/// migrations run (SQLite ignores the pragma inside a transaction) and every
/// migration ends with a `foreign_key_check`.
pub async fn run(pool: &SqlitePool) -> Result<usize, DbError> {
    let mut conn = pool.acquire().await?;
    create_migration_table(&mut *conn).await?;
    let current = get_schema_version(&mut *conn).await?;

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .collect();
    if pending.is_empty() {
        debug!(version = current, "Schema is up to date");
        return Ok(0);
    }

    sqlx::query("PRAGMA foreign_keys = OFF")
        .execute(&mut *conn)
        .await?;
    let mut result = Ok(());
    for migration in &pending {
        result = apply(&mut *conn, migration).await;
        if result.is_err() {
            break;
        }
    }
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    result?;

    Ok(pending.len())
}

/// Current schema version of the database behind `pool` (0 if never migrated).
///
/// # Errors
///
/// Returns an error if the version table cannot be read.
pub async fn current_version(pool: &SqlitePool) -> Result<i64, DbError> {
    let mut conn = pool.acquire().await?;
    create_migration_table(&mut *conn).await?;
    get_schema_version(&mut *conn).await
}

async fn apply(conn: &mut SqliteConnection, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        description = migration.description,
        "Running migration"
    );
    let wrap = |source: DbError| DbError::Migration {
        version: migration.version,
        source: Box::new(source),
    };

    let mut tx = conn.begin().await.map_err(|e| wrap(e.into()))?;
    (migration.apply)(&mut *tx).await.map_err(wrap)?;
    check_foreign_keys(&mut *tx).await.map_err(wrap)?;
    set_schema_version(&mut *tx, migration.version)
        .await
        .map_err(wrap)?;
    tx.commit().await.map_err(|e| wrap(e.into()))?;
    Ok(())
}

async fn create_migration_table(conn: &mut SqliteConnection) -> Result<(), DbError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn get_schema_version(conn: &mut SqliteConnection) -> Result<i64, DbError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(conn: &mut SqliteConnection, version: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn check_foreign_keys(conn: &mut SqliteConnection) -> Result<(), DbError> {
    let violation = sqlx::query("PRAGMA foreign_key_check")
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = violation {
        return Err(DbError::ForeignKeyViolation {
            table: row.try_get("table")?,
            rowid: row.try_get::<Option<i64>, _>("rowid")?.unwrap_or_default(),
        });
    }
    Ok(())
}

/// Column names of `table`, in declaration order.
async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>, DbError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

fn initial_schema(conn: &mut SqliteConnection) -> BoxFuture<'_, Result<(), DbError>> {
    Box::pin(async move {
        // IF NOT EXISTS adopts files written before the version table existed.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&mut *conn)
        .await?;

        // Older files never enforced the post reference.
        let orphans = sqlx::query("DELETE FROM comments WHERE post_id NOT IN (SELECT id FROM posts)")
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if orphans > 0 {
            warn!(orphans, "Dropped comments whose post no longer exists");
        }

        Ok(())
    })
}

fn threaded_comments(conn: &mut SqliteConnection) -> BoxFuture<'_, Result<(), DbError>> {
    Box::pin(async move {
        let columns = table_columns(conn, "comments").await?;
        let has = |name: &str| columns.iter().any(|c| c == name);

        // Legacy files stored the body in `text`.
        let content_column = if !has("content") && has("text") {
            "text"
        } else {
            "content"
        };
        // Keep an existing parent link only if it points at a top-level comment
        // of the same post. Anything else becomes a top-level comment.
        let had_parent_column = has("parent_id");
        let parent_expr = if had_parent_column {
            "(SELECT p.id FROM comments p \
              WHERE p.id = c.parent_id AND p.post_id = c.post_id AND p.parent_id IS NULL)"
        } else {
            "NULL"
        };

        sqlx::query(
            r"
            CREATE TABLE comments_new (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                parent_id INTEGER NULL REFERENCES comments(id) ON DELETE CASCADE,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&mut *conn)
        .await?;

        let copy = format!(
            r"
            INSERT INTO comments_new (id, post_id, parent_id, author, content, created_at)
            SELECT c.id, c.post_id, {parent_expr}, c.author, c.{content_column}, c.created_at
            FROM comments c
            ORDER BY c.id
            "
        );
        let copied = sqlx::query(&copy).execute(&mut *conn).await?.rows_affected();

        if had_parent_column {
            let (detached,): (i64,) = sqlx::query_as(
                r"
                SELECT COUNT(*) FROM comments c
                JOIN comments_new n ON n.id = c.id
                WHERE c.parent_id IS NOT NULL AND n.parent_id IS NULL
                ",
            )
            .fetch_one(&mut *conn)
            .await?;
            if detached > 0 {
                warn!(detached, "Detached comments whose parent was nested or on another post");
            }
        }

        sqlx::query("DROP TABLE comments")
            .execute(&mut *conn)
            .await?;
        sqlx::query("ALTER TABLE comments_new RENAME TO comments")
            .execute(&mut *conn)
            .await?;

        debug!(copied, "Rebuilt comments table with parent_id");
        Ok(())
    })
}

fn thread_guards(conn: &mut SqliteConnection) -> BoxFuture<'_, Result<(), DbError>> {
    Box::pin(async move {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at)")
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comments_post_created ON comments(post_id, created_at, id)",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments(parent_id)")
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r"
            CREATE TRIGGER IF NOT EXISTS comments_parent_same_post
            BEFORE INSERT ON comments
            WHEN NEW.parent_id IS NOT NULL
                AND (SELECT post_id FROM comments WHERE id = NEW.parent_id) IS NOT NEW.post_id
            BEGIN
                SELECT RAISE(ABORT, 'parent comment belongs to a different post');
            END
            ",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r"
            CREATE TRIGGER IF NOT EXISTS comments_depth_cap
            BEFORE INSERT ON comments
            WHEN NEW.parent_id IS NOT NULL
                AND (SELECT parent_id FROM comments WHERE id = NEW.parent_id) IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'only one level of nesting allowed');
            END
            ",
        )
        .execute(&mut *conn)
        .await?;

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_strictly_increasing() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.last().copied(), Some(LATEST_VERSION));
    }
}
