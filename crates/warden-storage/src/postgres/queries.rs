use warden_core::permission::{Permission, PermissionGrant, PermissionSet};
use warden_core::resource::Resource;
use warden_core::role::Role;

use crate::traits::StorageError;

pub(super) fn to_storage_error(e: sqlx::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

fn corrupt_row(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(format!("corrupt permission row: {e}"))
}

/// Row-locks the version counter. Every writer takes this lock first, so
/// writers run one after another and each sees every earlier commit.
pub async fn lock_version<'e>(executor: impl sqlx::PgExecutor<'e>) -> Result<i64, StorageError> {
    let row: (i64,) =
        sqlx::query_as("SELECT version FROM store_version WHERE id = true FOR UPDATE")
            .fetch_one(executor)
            .await
            .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn set_read_only_snapshot<'e>(
    executor: impl sqlx::PgExecutor<'e>,
) -> Result<(), StorageError> {
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(())
}

pub async fn bump_version<'e>(executor: impl sqlx::PgExecutor<'e>) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as(
        "UPDATE store_version SET version = version + 1 WHERE id = true RETURNING version",
    )
    .fetch_one(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn current_version<'e>(executor: impl sqlx::PgExecutor<'e>) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as("SELECT version FROM store_version WHERE id = true")
        .fetch_one(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(row.0)
}

// --- roles ---

type RoleRow = (String, bool, bool, Option<String>);

fn role_from_row((name, can_login, is_superuser, password_hash): RoleRow) -> Role {
    Role {
        name,
        can_login,
        is_superuser,
        password_hash,
    }
}

pub async fn role_exists<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    name: &str,
) -> Result<bool, StorageError> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM roles WHERE name = $1)")
        .bind(name)
        .fetch_one(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn fetch_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    name: &str,
) -> Result<Option<Role>, StorageError> {
    let row: Option<RoleRow> = sqlx::query_as(
        "SELECT name, can_login, is_superuser, password_hash FROM roles WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(row.map(role_from_row))
}

pub async fn fetch_roles<'e>(executor: impl sqlx::PgExecutor<'e>) -> Result<Vec<Role>, StorageError> {
    let rows: Vec<RoleRow> = sqlx::query_as(
        "SELECT name, can_login, is_superuser, password_hash FROM roles ORDER BY name",
    )
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(rows.into_iter().map(role_from_row).collect())
}

pub async fn insert_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &Role,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO roles (name, can_login, is_superuser, password_hash) VALUES ($1, $2, $3, $4)",
    )
    .bind(&role.name)
    .bind(role.can_login)
    .bind(role.is_superuser)
    .bind(&role.password_hash)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return StorageError::RoleAlreadyExists(role.name.clone());
        }
        to_storage_error(e)
    })?;
    Ok(())
}

pub async fn update_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &Role,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE roles SET can_login = $2, is_superuser = $3, password_hash = $4 WHERE name = $1",
    )
    .bind(&role.name)
    .bind(role.can_login)
    .bind(role.is_superuser)
    .bind(&role.password_hash)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn delete_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    name: &str,
) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM roles WHERE name = $1")
        .bind(name)
        .execute(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}

// --- keyspaces and tables ---

pub async fn object_exists<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    resource: &Resource,
) -> Result<bool, StorageError> {
    let row: (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM data_objects WHERE resource = $1)")
            .bind(resource.canonical())
            .fetch_one(executor)
            .await
            .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn insert_object<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    resource: &Resource,
) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO data_objects (resource) VALUES ($1)")
        .bind(resource.canonical())
        .execute(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StorageError::ObjectAlreadyExists(resource.clone());
            }
            to_storage_error(e)
        })?;
    Ok(())
}

/// Removes `resource` and, for a keyspace, its tables from the catalog.
pub async fn delete_objects_on<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    resource: &Resource,
) -> Result<u64, StorageError> {
    let canonical = resource.canonical();
    let result = sqlx::query(
        "DELETE FROM data_objects WHERE resource = $1 OR starts_with(resource, $2)",
    )
    .bind(&canonical)
    .bind(format!("{canonical}/"))
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(result.rows_affected())
}

// --- membership ---

pub async fn fetch_edges<'e>(
    executor: impl sqlx::PgExecutor<'e>,
) -> Result<Vec<(String, String)>, StorageError> {
    sqlx::query_as("SELECT granted, recipient FROM role_members ORDER BY recipient, granted")
        .fetch_all(executor)
        .await
        .map_err(to_storage_error)
}

pub async fn insert_edge<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    granted: &str,
    recipient: &str,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "INSERT INTO role_members (granted, recipient) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(granted)
    .bind(recipient)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_edge<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    granted: &str,
    recipient: &str,
) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM role_members WHERE granted = $1 AND recipient = $2")
        .bind(granted)
        .bind(recipient)
        .execute(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_edges_touching<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &str,
) -> Result<u64, StorageError> {
    let result = sqlx::query("DELETE FROM role_members WHERE granted = $1 OR recipient = $1")
        .bind(role)
        .execute(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(result.rows_affected())
}

// --- permissions ---

pub async fn insert_permission<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &str,
    resource: &Resource,
    permission: Permission,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        r#"
        INSERT INTO role_permissions (role, resource, permission)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(role)
    .bind(resource.canonical())
    .bind(permission.as_str())
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_permission<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &str,
    resource: &Resource,
    permission: Permission,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "DELETE FROM role_permissions WHERE role = $1 AND resource = $2 AND permission = $3",
    )
    .bind(role)
    .bind(resource.canonical())
    .bind(permission.as_str())
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_permission_set<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &str,
    resource: &Resource,
) -> Result<PermissionSet, StorageError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT permission FROM role_permissions WHERE role = $1 AND resource = $2")
            .bind(role)
            .bind(resource.canonical())
            .fetch_all(executor)
            .await
            .map_err(to_storage_error)?;

    rows.into_iter()
        .map(|(name,)| name.parse::<Permission>().map_err(corrupt_row))
        .collect()
}

/// All rows, optionally restricted to one holder, folded into one grant per
/// `(role, resource)` pair.
pub async fn fetch_grants<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: Option<&str>,
) -> Result<Vec<PermissionGrant>, StorageError> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT role, resource, permission FROM role_permissions
        WHERE $1::TEXT IS NULL OR role = $1
        ORDER BY role, resource
        "#,
    )
    .bind(role)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    let mut grants: Vec<PermissionGrant> = Vec::new();
    for (holder, resource, permission) in rows {
        let resource: Resource = resource.parse().map_err(corrupt_row)?;
        let permission: Permission = permission.parse().map_err(corrupt_row)?;

        match grants.last_mut() {
            Some(last) if last.role == holder && last.resource == resource => {
                last.permissions.insert(permission);
            }
            _ => grants.push(PermissionGrant::new(holder, resource, permission.into())),
        }
    }
    Ok(grants)
}

/// Deletes rows on `resource` and on every resource nested beneath it.
pub async fn delete_permissions_on<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    resource: &Resource,
) -> Result<u64, StorageError> {
    let canonical = resource.canonical();
    let result = sqlx::query(
        r#"
        DELETE FROM role_permissions
        WHERE resource = $1 OR starts_with(resource, $2)
        "#,
    )
    .bind(&canonical)
    .bind(format!("{canonical}/"))
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(result.rows_affected())
}

/// Number of distinct `(role, resource)` pairs the cascade for `resource` will remove.
pub async fn count_pairs_on<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    resource: &Resource,
) -> Result<i64, StorageError> {
    let canonical = resource.canonical();
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(DISTINCT (role, resource)) FROM role_permissions
        WHERE resource = $1 OR starts_with(resource, $2)
        "#,
    )
    .bind(&canonical)
    .bind(format!("{canonical}/"))
    .fetch_one(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn delete_permissions_held_by<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &str,
) -> Result<u64, StorageError> {
    let result = sqlx::query("DELETE FROM role_permissions WHERE role = $1")
        .bind(role)
        .execute(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(result.rows_affected())
}
