use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, NewTask, Task, TaskStatus};
use crate::store::SharedStore;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub assigned_to_id: i64,
}

impl CreateTaskRequest {
    fn validate(self) -> Result<NewTask, ApiError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InputInvalid("name is required".into()));
        }
        if self.project_id <= 0 {
            return Err(ApiError::InputInvalid("projectId is required".into()));
        }
        if self.assigned_to_id <= 0 {
            return Err(ApiError::InputInvalid("assignedToId is required".into()));
        }
        Ok(NewTask {
            name,
            status: self.status.unwrap_or_default(),
            project_id: self.project_id,
            assigned_to_id: self.assigned_to_id,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MyTasksRequest {
    /// Only return tasks in this state.
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

#[openapi(tag = "Tasks")]
#[post("/tasks", data = "<request>")]
pub async fn create_task(
    store: &State<SharedStore>,
    user: AuthUser,
    request: Json<CreateTaskRequest>,
) -> ApiResult<status::Custom<Json<ApiResponse<Task>>>> {
    let new_task = request.into_inner().validate()?;
    let task = store.create_task(new_task).await?;
    log::info!(
        "user {} created task {} in project {}",
        user.id(),
        task.id,
        task.project_id
    );
    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::new(201, "task created", task)),
    ))
}

#[openapi(tag = "Tasks")]
#[get("/tasks/<id>")]
pub async fn get_task(
    store: &State<SharedStore>,
    _user: AuthUser,
    id: i64,
) -> ApiResult<Json<ApiResponse<Task>>> {
    let task = store
        .get_task(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))?;
    Ok(Json(ApiResponse::ok("task retrieved", task)))
}

/// Tasks assigned to the caller, optionally filtered by status.
#[openapi(tag = "Tasks")]
#[post("/mytasks", data = "<request>")]
pub async fn my_tasks(
    store: &State<SharedStore>,
    user: AuthUser,
    request: Json<MyTasksRequest>,
) -> ApiResult<Json<ApiResponse<Vec<Task>>>> {
    let tasks = store
        .tasks_assigned_to(user.id(), request.into_inner().status)
        .await?;
    Ok(Json(ApiResponse::ok("tasks retrieved", tasks)))
}
