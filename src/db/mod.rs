//! Database module for SQLite persistence using SeaORM

pub mod entities;
pub mod store;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;

/// Connection URL for a SQLite file, created on first use
pub fn sqlite_url(db_path: &Path) -> String {
    format!("sqlite:{}?mode=rwc", db_path.display())
}

/// Initialize database connection and create tables
pub async fn init_database(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", db_url);

    let mut opts = ConnectOptions::new(db_url.to_string());
    opts.sqlx_logging(false);
    if db_url.contains(":memory:") {
        // Each pooled connection would otherwise open its own empty database
        opts.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opts).await?;

    // Create tables
    create_tables(&db).await?;

    Ok(db)
}

async fn exec(db: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), sql.to_string()))
        .await?;
    Ok(())
}

/// Create all tables if they don't exist
async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Users table (namespaces are users)
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            uuid TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .await?;

    // Repositories table
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            git_path TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            nickname TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            private INTEGER NOT NULL DEFAULT 0,
            readme TEXT NOT NULL DEFAULT '',
            license TEXT NOT NULL DEFAULT '',
            default_branch TEXT NOT NULL DEFAULT 'main',
            repository_type TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT 'local',
            sync_status TEXT NOT NULL DEFAULT 'pending',
            http_clone_url TEXT NOT NULL DEFAULT '',
            ssh_clone_url TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(repository_type, path)
        )
        "#,
    )
    .await?;

    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_repos_user ON repositories(user_id)"#,
    )
    .await?;

    // Typed entity tables, one row per repository of that type
    for table in ["models", "datasets", "codes"] {
        let base_model = if table == "models" { "base_model TEXT," } else { "" };
        exec(
            db,
            &format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repository_id INTEGER NOT NULL UNIQUE,
                    {base_model}
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
                )
                "#
            ),
        )
        .await?;
    }

    // Mirror sources table
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS mirror_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL UNIQUE,
            info TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .await?;

    // Mirrors table (1:1 with repositories)
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS mirrors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL UNIQUE,
            mirror_source_id INTEGER NOT NULL DEFAULT 0,
            source_url TEXT NOT NULL,
            push_url TEXT NOT NULL DEFAULT '',
            username TEXT NOT NULL DEFAULT '',
            push_username TEXT NOT NULL DEFAULT '',
            push_access_token TEXT NOT NULL DEFAULT '',
            local_repo_path TEXT NOT NULL,
            source_repo_path TEXT NOT NULL,
            mirror_task_id INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'waiting',
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            last_message TEXT NOT NULL DEFAULT '',
            push_mirror_created INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
        )
        "#,
    )
    .await?;

    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_mirrors_status ON mirrors(status)"#,
    )
    .await?;

    // Git server service-account tokens
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS git_server_access_tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            token TEXT NOT NULL,
            username TEXT NOT NULL DEFAULT '',
            token_type TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .await?;

    // Indexed repository trees
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS repository_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            file_type TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            commit_sha TEXT NOT NULL DEFAULT '',
            lfs_relative_path TEXT NOT NULL DEFAULT '',
            branch TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE,
            UNIQUE(repository_id, path, branch)
        )
        "#,
    )
    .await?;

    // Received sync versions
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS sync_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL UNIQUE,
            source_id INTEGER NOT NULL DEFAULT 0,
            repo_path TEXT NOT NULL,
            repo_type TEXT NOT NULL,
            last_modified_at TEXT NOT NULL DEFAULT '',
            change_log TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .await?;

    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_sync_versions_completed ON sync_versions(completed)"#,
    )
    .await?;

    // Tags and their repository links
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            group_name TEXT NOT NULL DEFAULT '',
            built_in INTEGER NOT NULL DEFAULT 0,
            show_name TEXT NOT NULL DEFAULT '',
            scope TEXT NOT NULL DEFAULT '',
            UNIQUE(name, category, scope)
        )
        "#,
    )
    .await?;

    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS repository_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
            UNIQUE(repository_id, tag_id)
        )
        "#,
    )
    .await?;

    // File listings copied from sync peers
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            parent_path TEXT NOT NULL DEFAULT '',
            size INTEGER NOT NULL DEFAULT 0,
            last_commit_message TEXT NOT NULL DEFAULT '',
            last_commit_date TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
        )
        "#,
    )
    .await?;

    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_files_repo ON files(repository_id)"#,
    )
    .await?;

    tracing::info!("Database tables initialized");
    Ok(())
}
