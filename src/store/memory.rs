//! In-process store backed by plain collections behind one mutex.
//!
//! Used by the test suite and for local experiments. Every trait method takes
//! the lock once and never awaits while holding it, so each call is atomic.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::{
    Identity, NewIdentity, NewTask, ProfilePatch, Project, ResetTokenRecord, Task, TaskStatus,
};
use crate::store::{
    ProjectStore, ResetTokenStore, StoreError, StoreResult, TaskStore, UserStore,
    normalize_email,
};

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    next_project_id: i64,
    next_task_id: i64,
    users: BTreeMap<i64, Identity>,
    // keyed by owning identity: at most one token per user
    reset_tokens: HashMap<i64, ResetTokenRecord>,
    projects: BTreeMap<i64, Project>,
    tasks: BTreeMap<i64, Task>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        let email = normalize_email(email);
        self.users
            .values()
            .any(|user| Some(user.id) != except && normalize_email(&user.email) == email)
    }

    fn reset_owner(&self, token_hash: &str) -> Option<i64> {
        self.reset_tokens
            .values()
            .find(|record| record.token_hash == token_hash)
            .map(|record| record.user_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete an identity together with its reset token and assigned tasks,
    /// mirroring the cascading foreign keys of the relational schema.
    pub fn remove_user(&self, id: i64) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.users.remove(&id).is_some();
        inner.reset_tokens.remove(&id);
        inner.tasks.retain(|_, task| task.assigned_to_id != id);
        removed
    }

    pub fn reset_token_count(&self) -> usize {
        self.inner.lock().reset_tokens.len()
    }
}

#[rocket::async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<Identity>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let email = normalize_email(email);
        Ok(self
            .inner
            .lock()
            .users
            .values()
            .find(|user| normalize_email(&user.email) == email)
            .cloned())
    }

    async fn create_user(&self, user: NewIdentity) -> StoreResult<Identity> {
        let mut inner = self.inner.lock();
        if inner.email_taken(&user.email, None) {
            return Err(StoreError::Conflict(format!(
                "email '{}' is already registered",
                user.email
            )));
        }

        inner.next_user_id += 1;
        let identity = Identity {
            id: inner.next_user_id,
            email: normalize_email(&user.email),
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            address: user.address,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        inner.users.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update_profile(
        &self,
        id: i64,
        patch: &ProfilePatch,
    ) -> StoreResult<Option<Identity>> {
        let mut inner = self.inner.lock();
        if let Some(email) = &patch.email {
            if inner.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict(format!(
                    "email '{email}' is already registered"
                )));
            }
        }

        let Some(identity) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply_to(identity);
        identity.email = normalize_email(&identity.email);
        Ok(Some(identity.clone()))
    }
}

#[rocket::async_trait]
impl ResetTokenStore for MemoryStore {
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::InvalidReference(format!(
                "user {user_id} does not exist"
            )));
        }
        inner.reset_tokens.insert(
            user_id,
            ResetTokenRecord {
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn find_reset_token(&self, token_hash: &str) -> StoreResult<Option<ResetTokenRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .reset_owner(token_hash)
            .and_then(|user_id| inner.reset_tokens.get(&user_id).cloned()))
    }

    async fn delete_reset_token(&self, token_hash: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        match inner.reset_owner(token_hash) {
            Some(user_id) => Ok(inner.reset_tokens.remove(&user_id).is_some()),
            None => Ok(false),
        }
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock();
        let Some(user_id) = inner.reset_owner(token_hash) else {
            return Ok(None);
        };
        let still_valid = inner
            .reset_tokens
            .get(&user_id)
            .is_some_and(|record| record.expires_at >= now);
        if !still_valid || !inner.users.contains_key(&user_id) {
            return Ok(None);
        }

        inner.reset_tokens.remove(&user_id);
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(Some(user_id))
    }
}

#[rocket::async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, name: &str) -> StoreResult<Project> {
        let mut inner = self.inner.lock();
        if inner.projects.values().any(|project| project.name == name) {
            return Err(StoreError::Conflict(format!(
                "project '{name}' already exists"
            )));
        }

        inner.next_project_id += 1;
        let project = Project {
            id: inner.next_project_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: i64) -> StoreResult<Option<Project>> {
        Ok(self.inner.lock().projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        Ok(self.inner.lock().projects.values().cloned().collect())
    }

    async fn delete_project(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let removed = inner.projects.remove(&id).is_some();
        if removed {
            inner.tasks.retain(|_, task| task.project_id != id);
        }
        Ok(removed)
    }

    async fn delete_all_projects(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let removed = inner.projects.len() as u64;
        inner.projects.clear();
        inner.tasks.clear();
        Ok(removed)
    }
}

#[rocket::async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: NewTask) -> StoreResult<Task> {
        let mut inner = self.inner.lock();
        if !inner.projects.contains_key(&task.project_id) {
            return Err(StoreError::InvalidReference(format!(
                "project {} does not exist",
                task.project_id
            )));
        }
        if !inner.users.contains_key(&task.assigned_to_id) {
            return Err(StoreError::InvalidReference(format!(
                "user {} does not exist",
                task.assigned_to_id
            )));
        }
        if inner
            .tasks
            .values()
            .any(|existing| existing.project_id == task.project_id && existing.name == task.name)
        {
            return Err(StoreError::Conflict(format!(
                "task '{}' already exists in project {}",
                task.name, task.project_id
            )));
        }

        inner.next_task_id += 1;
        let created = Task {
            id: inner.next_task_id,
            name: task.name,
            status: task.status,
            project_id: task.project_id,
            assigned_to_id: task.assigned_to_id,
            created_at: Utc::now(),
        };
        inner.tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_task(&self, id: i64) -> StoreResult<Option<Task>> {
        Ok(self.inner.lock().tasks.get(&id).cloned())
    }

    async fn tasks_assigned_to(
        &self,
        user_id: i64,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        Ok(self
            .inner
            .lock()
            .tasks
            .values()
            .filter(|task| task.assigned_to_id == user_id)
            .filter(|task| status.is_none_or(|wanted| task.status == wanted))
            .cloned()
            .collect())
    }
}
