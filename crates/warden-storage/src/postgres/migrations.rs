use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        name            TEXT PRIMARY KEY,
        can_login       BOOLEAN NOT NULL DEFAULT false,
        is_superuser    BOOLEAN NOT NULL DEFAULT false,
        password_hash   TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_members (
        granted     TEXT NOT NULL REFERENCES roles(name) ON DELETE CASCADE,
        recipient   TEXT NOT NULL REFERENCES roles(name) ON DELETE CASCADE,
        PRIMARY KEY (granted, recipient),
        CHECK (granted <> recipient)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role        TEXT NOT NULL REFERENCES roles(name) ON DELETE CASCADE,
        resource    TEXT NOT NULL,
        permission  TEXT NOT NULL,
        PRIMARY KEY (role, resource, permission)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_role_permissions_resource ON role_permissions (resource)",
    r#"
    CREATE TABLE IF NOT EXISTS data_objects (
        resource    TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS store_version (
        id          BOOLEAN PRIMARY KEY DEFAULT true CHECK (id),
        version     BIGINT NOT NULL
    )
    "#,
    "INSERT INTO store_version (id, version) VALUES (true, 0) ON CONFLICT DO NOTHING",
];

/// Creates the catalog tables. Safe to run repeatedly.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(tables = 5, "permission store migrations applied");
    Ok(())
}
