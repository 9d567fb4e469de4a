//! Project CRUD. Projects are shared by every authenticated identity and
//! their names are unique.

use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, Project};
use crate::store::SharedStore;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeletedCount {
    pub deleted: u64,
}

#[openapi(tag = "Projects")]
#[post("/projects", data = "<request>")]
pub async fn create_project(
    store: &State<SharedStore>,
    user: AuthUser,
    request: Json<CreateProjectRequest>,
) -> ApiResult<status::Custom<Json<ApiResponse<Project>>>> {
    let name = request.into_inner().name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::InputInvalid("name is required".into()).into());
    }

    let project = store.create_project(&name).await?;
    log::info!("user {} created project {}", user.id(), project.id);
    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::new(201, "project created", project)),
    ))
}

#[openapi(tag = "Projects")]
#[get("/projects")]
pub async fn list_projects(
    store: &State<SharedStore>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<Project>>>> {
    let projects = store.list_projects().await?;
    let message = if projects.is_empty() {
        "no projects"
    } else {
        "projects retrieved"
    };
    Ok(Json(ApiResponse::ok(message, projects)))
}

#[openapi(tag = "Projects")]
#[get("/projects/<id>")]
pub async fn get_project(
    store: &State<SharedStore>,
    _user: AuthUser,
    id: i64,
) -> ApiResult<Json<ApiResponse<Project>>> {
    let project = store
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {id} not found")))?;
    Ok(Json(ApiResponse::ok("project retrieved", project)))
}

/// Delete one project together with its tasks.
#[openapi(tag = "Projects")]
#[delete("/projects/<id>")]
pub async fn delete_project(
    store: &State<SharedStore>,
    user: AuthUser,
    id: i64,
) -> ApiResult<Json<ApiResponse<()>>> {
    if !store.delete_project(id).await? {
        return Err(ApiError::NotFound(format!("project {id} not found")).into());
    }
    log::info!("user {} deleted project {}", user.id(), id);
    Ok(Json(ApiResponse::message(200, "project deleted")))
}

#[openapi(tag = "Projects")]
#[delete("/projects")]
pub async fn delete_all_projects(
    store: &State<SharedStore>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<DeletedCount>>> {
    let deleted = store.delete_all_projects().await?;
    log::warn!("user {} deleted all {} projects", user.id(), deleted);
    Ok(Json(ApiResponse::ok(
        "all projects deleted",
        DeletedCount { deleted },
    )))
}
