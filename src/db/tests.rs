#[cfg(test)]
mod tests {
    use std::path::Path;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::tempdir;

    use super::super::{
        distinct_values, execute_select, format_schemas, init_pool, is_textual, list_tables,
        profile_column, table_schema, validate, DbPool,
    };
    use crate::config::DisambiguatorConfig;
    use crate::error::AppError;

    /// Builds the fixture database read-write; the code under test only ever
    /// sees it through the read-only pool.
    async fn seed(path: &Path, statements: &[&str]) -> DbPool {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn init_pool_refuses_writes() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        seed(&db_path, &["CREATE TABLE artists (name TEXT)"])
            .await
            .close()
            .await;

        let pool = init_pool(&db_path).await.unwrap();
        let err = sqlx::query("INSERT INTO artists (name) VALUES ('x')")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("readonly"));
    }

    #[tokio::test]
    async fn init_pool_requires_existing_database() {
        let dir = tempdir().unwrap();
        assert!(init_pool(dir.path().join("missing.db")).await.is_err());
    }

    #[tokio::test]
    async fn introspection_reads_columns_and_foreign_keys() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        seed(
            &db_path,
            &[
                "CREATE TABLE artists (artist_id INTEGER PRIMARY KEY, name NVARCHAR(120))",
                "CREATE TABLE albums (album_id INTEGER PRIMARY KEY, title TEXT, \
                 artist_id INTEGER REFERENCES artists(artist_id))",
            ],
        )
        .await
        .close()
        .await;
        let pool = init_pool(&db_path).await.unwrap();

        let tables = list_tables(&pool).await.unwrap();
        assert_eq!(tables, vec!["albums".to_string(), "artists".to_string()]);

        let schema = table_schema(&pool, "albums").await.unwrap();
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[1].name, "title");
        assert_eq!(schema.columns[1].declared_type, "TEXT");
        assert_eq!(schema.foreign_keys.len(), 1);
        assert_eq!(schema.foreign_keys[0].from_column, "artist_id");
        assert_eq!(schema.foreign_keys[0].references_table, "artists");

        let formatted = format_schemas(&[schema]);
        assert!(formatted.contains("Table: albums"));
        assert!(formatted.contains("title (TEXT)"));
        assert!(formatted.contains("artist_id -> artists(artist_id)"));
    }

    #[tokio::test]
    async fn introspecting_unknown_table_is_an_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        seed(&db_path, &["CREATE TABLE artists (name TEXT)"])
            .await
            .close()
            .await;
        let pool = init_pool(&db_path).await.unwrap();

        match table_schema(&pool, "nope").await {
            Err(AppError::Introspection { table, .. }) => assert_eq!(table, "nope"),
            other => panic!("expected introspection error, got {:?}", other.map(|s| s.name)),
        }
    }

    #[tokio::test]
    async fn execute_select_renders_every_storage_class() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        seed(
            &db_path,
            &[
                "CREATE TABLE tracks (title TEXT, plays INTEGER, rating REAL, notes TEXT)",
                "INSERT INTO tracks VALUES ('Thunderstruck', 42, 4.5, NULL)",
            ],
        )
        .await
        .close()
        .await;
        let pool = init_pool(&db_path).await.unwrap();

        let output = execute_select(&pool, "SELECT * FROM tracks").await.unwrap();
        assert_eq!(output.columns, vec!["title", "plays", "rating", "notes"]);
        assert_eq!(output.row_count, 1);
        assert_eq!(output.rows[0], vec!["Thunderstruck", "42", "4.5", "NULL"]);
    }

    #[tokio::test]
    async fn execute_select_surfaces_the_raw_database_message() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        seed(&db_path, &["CREATE TABLE artists (name TEXT)"])
            .await
            .close()
            .await;
        let pool = init_pool(&db_path).await.unwrap();

        let err = execute_select(&pool, "SELECT * FROM listeners")
            .await
            .unwrap_err();
        assert!(err.contains("no such table"), "got: {err}");

        assert!(validate(&pool, "SELECT name FROM artists").await.is_ok());
        let err = validate(&pool, "SELEC name FROM artists").await.unwrap_err();
        assert!(err.contains("syntax error"), "got: {err}");
    }

    #[tokio::test]
    async fn distinct_values_skip_nulls_and_respect_the_cap() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        let rw = seed(
            &db_path,
            &[
                "CREATE TABLE artists (name TEXT)",
                "INSERT INTO artists VALUES ('AC/DC'), ('AC/DC'), ('Accept'), (NULL), ('Aerosmith')",
            ],
        )
        .await;
        rw.close().await;
        let pool = init_pool(&db_path).await.unwrap();

        let values = distinct_values(&pool, "artists", "name", 10_000)
            .await
            .unwrap();
        assert_eq!(values.len(), 3);
        assert!(!values.iter().any(|v| v == "NULL"));

        let capped = distinct_values(&pool, "artists", "name", 2).await.unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn eligibility_boundary_sits_between_ten_and_eleven() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        let rw = seed(&db_path, &["CREATE TABLE artists (name NVARCHAR(120))"]).await;
        for i in 0..10 {
            sqlx::query(&format!("INSERT INTO artists VALUES ('artist-{i}')"))
                .execute(&rw)
                .await
                .unwrap();
        }
        rw.close().await;
        let pool = init_pool(&db_path).await.unwrap();
        let config = DisambiguatorConfig::default();

        let profile = profile_column(&pool, "artists", "name", "NVARCHAR(120)")
            .await
            .unwrap();
        assert_eq!(profile.distinct_count, 10);
        assert!(!profile.is_eligible(&config));
        drop(pool);

        let rw = seed(&db_path, &["INSERT INTO artists VALUES ('artist-10')"]).await;
        rw.close().await;
        let pool = init_pool(&db_path).await.unwrap();
        let profile = profile_column(&pool, "artists", "name", "NVARCHAR(120)")
            .await
            .unwrap();
        assert_eq!(profile.distinct_count, 11);
        assert!(profile.is_eligible(&config));
    }

    #[tokio::test]
    async fn low_ratio_columns_are_not_eligible() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        let rw = seed(&db_path, &["CREATE TABLE plays (genre TEXT)"]).await;
        // 12 distinct genres spread over 100 rows: high cardinality in
        // absolute terms, far too repetitive to disambiguate against.
        for i in 0..100 {
            sqlx::query(&format!("INSERT INTO plays VALUES ('genre-{}')", i % 12))
                .execute(&rw)
                .await
                .unwrap();
        }
        rw.close().await;
        let pool = init_pool(&db_path).await.unwrap();

        let profile = profile_column(&pool, "plays", "genre", "TEXT").await.unwrap();
        assert_eq!(profile.distinct_count, 12);
        assert!(profile.distinct_ratio() < 0.5);
        assert!(!profile.is_eligible(&DisambiguatorConfig::default()));
    }

    #[test]
    fn textual_type_detection() {
        assert!(is_textual("NVARCHAR(160)"));
        assert!(is_textual("varchar(40)"));
        assert!(is_textual("TEXT"));
        assert!(!is_textual("INTEGER"));
        assert!(!is_textual("DATETIME"));
        assert!(!is_textual("NUMERIC(10,2)"));
    }
}
