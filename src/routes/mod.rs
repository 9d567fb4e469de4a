//! HTTP handlers for the non-auth resources.
//!
//! The `/users` handlers live next to the auth core in `crate::auth::routes`.
//! Every handler here is annotated with `#[openapi]` so `rocket_okapi` can
//! derive the OpenAPI document.

pub mod health;
pub mod projects;
pub mod tasks;
