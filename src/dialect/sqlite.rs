use super::{Db, Dialect};

/// SQLite dialect implementation of the `Dialect` trait.
#[cfg(feature = "sqlite")]
pub struct SqliteDialect;

#[cfg(feature = "sqlite")]
impl Dialect for SqliteDialect {
    fn placeholder(_idx: usize) -> String {
        "?".to_string()
    }

    fn ensure_image_tag_statement() -> String {
        "INSERT OR IGNORE INTO image_tags (image_id, value) VALUES (?, ?)".to_string()
    }

    async fn migration(pool: &sqlx::Pool<Db>) -> Result<(), sqlx::Error> {
        let stmts = vec![
            r#"CREATE TABLE IF NOT EXISTS images (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                name TEXT,
                owner TEXT,
                status TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                size INTEGER,
                checksum TEXT,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT
            );"#,
            r#"CREATE TABLE IF NOT EXISTS image_members (
                image_id TEXT NOT NULL,
                member TEXT NOT NULL,
                can_share INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT,
                FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
            );"#,
            r#"CREATE UNIQUE INDEX IF NOT EXISTS image_members_live
                ON image_members (image_id, member) WHERE deleted = 0;"#,
            r#"CREATE TABLE IF NOT EXISTS image_tags (
                image_id TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (image_id, value),
                FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
            );"#,
        ];

        for stmt in stmts {
            sqlx::query(stmt).execute(pool).await?;
        }

        Ok(())
    }
}
