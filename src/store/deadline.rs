use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{
    Identity, NewIdentity, NewTask, ProfilePatch, Project, ResetTokenRecord, Task, TaskStatus,
};
use crate::store::{
    ProjectStore, ResetTokenStore, StoreError, StoreResult, TaskStore, UserStore,
};

/// Store decorator that bounds every call with a deadline.
///
/// A call that does not finish in time fails with [`StoreError::Timeout`]
/// instead of holding the request open.
pub struct Deadline<S> {
    inner: S,
    limit: Duration,
}

impl<S> Deadline<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn run<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                log::error!("storage call timed out after {:?}", self.limit);
                Err(StoreError::Timeout(self.limit))
            }
        }
    }
}

#[rocket::async_trait]
impl<S: UserStore> UserStore for Deadline<S> {
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<Identity>> {
        self.run(self.inner.find_user_by_id(id)).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        self.run(self.inner.find_user_by_email(email)).await
    }

    async fn create_user(&self, user: NewIdentity) -> StoreResult<Identity> {
        self.run(self.inner.create_user(user)).await
    }

    async fn update_profile(
        &self,
        id: i64,
        patch: &ProfilePatch,
    ) -> StoreResult<Option<Identity>> {
        self.run(self.inner.update_profile(id, patch)).await
    }
}

#[rocket::async_trait]
impl<S: ResetTokenStore> ResetTokenStore for Deadline<S> {
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.run(self.inner.upsert_reset_token(user_id, token_hash, expires_at))
            .await
    }

    async fn find_reset_token(&self, token_hash: &str) -> StoreResult<Option<ResetTokenRecord>> {
        self.run(self.inner.find_reset_token(token_hash)).await
    }

    async fn delete_reset_token(&self, token_hash: &str) -> StoreResult<bool> {
        self.run(self.inner.delete_reset_token(token_hash)).await
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        self.run(
            self.inner
                .complete_password_reset(token_hash, password_hash, now),
        )
        .await
    }
}

#[rocket::async_trait]
impl<S: ProjectStore> ProjectStore for Deadline<S> {
    async fn create_project(&self, name: &str) -> StoreResult<Project> {
        self.run(self.inner.create_project(name)).await
    }

    async fn get_project(&self, id: i64) -> StoreResult<Option<Project>> {
        self.run(self.inner.get_project(id)).await
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        self.run(self.inner.list_projects()).await
    }

    async fn delete_project(&self, id: i64) -> StoreResult<bool> {
        self.run(self.inner.delete_project(id)).await
    }

    async fn delete_all_projects(&self) -> StoreResult<u64> {
        self.run(self.inner.delete_all_projects()).await
    }
}

#[rocket::async_trait]
impl<S: TaskStore> TaskStore for Deadline<S> {
    async fn create_task(&self, task: NewTask) -> StoreResult<Task> {
        self.run(self.inner.create_task(task)).await
    }

    async fn get_task(&self, id: i64) -> StoreResult<Option<Task>> {
        self.run(self.inner.get_task(id)).await
    }

    async fn tasks_assigned_to(
        &self,
        user_id: i64,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        self.run(self.inner.tasks_assigned_to(user_id, status)).await
    }
}
