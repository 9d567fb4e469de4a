//! Storage collaborator for the tracker: identities, reset tokens, projects
//! and tasks.
//!
//! Every backend implements the four narrow traits below; the rest of the
//! crate holds a [`SharedStore`] (`Arc<dyn Store>`). Operations that must be
//! atomic (the reset-token upsert and [`ResetTokenStore::complete_password_reset`])
//! are single statements or single transactions in every backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Identity, NewIdentity, NewTask, ProfilePatch, Project, ResetTokenRecord, Task, TaskStatus,
};

pub mod deadline;
pub mod memory;
pub mod postgres;

pub use deadline::Deadline;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("storage call exceeded its {0:?} deadline")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Database(#[from] rocket_db_pools::sqlx::Error),
}

#[rocket::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<Identity>>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    /// Fails with [`StoreError::Conflict`] when the email is already taken.
    async fn create_user(&self, user: NewIdentity) -> StoreResult<Identity>;

    /// Returns `None` when the identity no longer exists.
    async fn update_profile(&self, id: i64, patch: &ProfilePatch)
    -> StoreResult<Option<Identity>>;
}

#[rocket::async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Insert or overwrite the single reset token owned by `user_id`.
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn find_reset_token(&self, token_hash: &str) -> StoreResult<Option<ResetTokenRecord>>;

    async fn delete_reset_token(&self, token_hash: &str) -> StoreResult<bool>;

    /// Atomically delete the token (if still valid at `now`) and store the new
    /// password hash for its owner. Returns the owner, or `None` when the
    /// token was already consumed or has expired.
    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>>;
}

#[rocket::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, name: &str) -> StoreResult<Project>;

    async fn get_project(&self, id: i64) -> StoreResult<Option<Project>>;

    async fn list_projects(&self) -> StoreResult<Vec<Project>>;

    async fn delete_project(&self, id: i64) -> StoreResult<bool>;

    async fn delete_all_projects(&self) -> StoreResult<u64>;
}

#[rocket::async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: NewTask) -> StoreResult<Task>;

    async fn get_task(&self, id: i64) -> StoreResult<Option<Task>>;

    async fn tasks_assigned_to(
        &self,
        user_id: i64,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>>;
}

pub trait Store: UserStore + ResetTokenStore + ProjectStore + TaskStore {}

impl<T> Store for T where T: UserStore + ResetTokenStore + ProjectStore + TaskStore {}

pub type SharedStore = Arc<dyn Store>;

/// Lower-case and trim an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
