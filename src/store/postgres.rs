use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool, Row, postgres::PgRow};

use crate::models::{
    Identity, NewIdentity, NewTask, ProfilePatch, Project, ResetTokenRecord, Task, TaskStatus,
};
use crate::store::{
    ProjectStore, ResetTokenStore, StoreError, StoreResult, TaskStore, UserStore,
    normalize_email,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, phone, address, password_hash, created_at";
const TASK_COLUMNS: &str = "id, name, status, project_id, assigned_to_id, created_at";

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn database_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Translate constraint violations into store-level errors.
fn classify(err: sqlx::Error, conflict: impl FnOnce() -> String) -> StoreError {
    match database_code(&err).as_deref() {
        Some(UNIQUE_VIOLATION) => StoreError::Conflict(conflict()),
        Some(FOREIGN_KEY_VIOLATION) => {
            StoreError::InvalidReference("referenced row does not exist".into())
        }
        _ => StoreError::Database(err),
    }
}

fn task_from_row(row: &PgRow) -> StoreResult<Task> {
    let status: String = row.try_get("status")?;
    let status = status.parse::<TaskStatus>().map_err(|err| {
        StoreError::Database(sqlx::Error::Decode(err.into()))
    })?;

    Ok(Task {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status,
        project_id: row.try_get("project_id")?,
        assigned_to_id: row.try_get("assigned_to_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[rocket::async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<Identity>> {
        let user = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let user = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewIdentity) -> StoreResult<Identity> {
        let email = normalize_email(&user.email);
        sqlx::query_as::<_, Identity>(&format!(
            r#"
            INSERT INTO users (email, first_name, last_name, phone, address, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify(err, || format!("email '{email}' is already registered")))
    }

    async fn update_profile(
        &self,
        id: i64,
        patch: &ProfilePatch,
    ) -> StoreResult<Option<Identity>> {
        let email = patch.email.as_deref().map(normalize_email);
        sqlx::query_as::<_, Identity>(&format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&email)
        .bind(&patch.phone)
        .bind(&patch.address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            classify(err, || {
                format!(
                    "email '{}' is already registered",
                    email.clone().unwrap_or_default()
                )
            })
        })
    }
}

#[rocket::async_trait]
impl ResetTokenStore for PgStore {
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = now()
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, || "reset token collision".to_string()))?;
        Ok(())
    }

    async fn find_reset_token(&self, token_hash: &str) -> StoreResult<Option<ResetTokenRecord>> {
        let record = sqlx::query_as::<_, ResetTokenRecord>(
            "SELECT user_id, token_hash, expires_at FROM password_reset_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_reset_token(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        // The DELETE claims the row; a concurrent confirm sees zero rows.
        let user_id: Option<i64> = sqlx::query_scalar(
            "DELETE FROM password_reset_tokens WHERE token_hash = $1 AND expires_at >= $2 RETURNING user_id",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        let updated = sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(user_id))
    }
}

#[rocket::async_trait]
impl ProjectStore for PgStore {
    async fn create_project(&self, name: &str) -> StoreResult<Project> {
        sqlx::query_as::<_, Project>(
            "INSERT INTO projects (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify(err, || format!("project '{name}' already exists")))
    }

    async fn get_project(&self, id: i64) -> StoreResult<Option<Project>> {
        let project =
            sqlx::query_as::<_, Project>("SELECT id, name, created_at FROM projects WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(project)
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let projects =
            sqlx::query_as::<_, Project>("SELECT id, name, created_at FROM projects ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(projects)
    }

    async fn delete_project(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_projects(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM projects")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[rocket::async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, task: NewTask) -> StoreResult<Task> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (name, status, project_id, assigned_to_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.name)
        .bind(task.status.as_str())
        .bind(task.project_id)
        .bind(task.assigned_to_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            classify(err, || {
                format!(
                    "task '{}' already exists in project {}",
                    task.name, task.project_id
                )
            })
        })?;

        task_from_row(&row)
    }

    async fn get_task(&self, id: i64) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn tasks_assigned_to(
        &self,
        user_id: i64,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE assigned_to_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY id
            "#
        ))
        .bind(user_id)
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }
}
