#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod request_logger;
pub mod routes;
pub mod store;

use std::sync::{Arc, Once};

use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::{Method, Status};
use rocket::{Build, Catcher, Request, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};

use crate::auth::{AuthConfig, AuthState};
use crate::db::TrackerDb;
use crate::error::{ErrorResponse, PERMISSION_DENIED, error_response};
use crate::notify::EmailNotifier;
use crate::request_logger::RequestLogger;
use crate::store::{Deadline, PgStore, SharedStore};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every `/api/v1` route, plus the generated `openapi.json`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Health
        routes::health::health_check,
        // Users
        auth::routes::register,
        auth::routes::login,
        auth::routes::me,
        auth::routes::update_me,
        auth::routes::request_password_reset,
        auth::routes::confirm_password_reset,
        // Projects
        routes::projects::create_project,
        routes::projects::list_projects,
        routes::projects::get_project,
        routes::projects::delete_project,
        routes::projects::delete_all_projects,
        // Tasks
        routes::tasks::create_task,
        routes::tasks::get_task,
        routes::tasks::my_tasks,
    ]
}

#[catch(400)]
fn bad_request() -> ErrorResponse {
    error_response(Status::BadRequest, "malformed request")
}

#[catch(401)]
fn unauthorized() -> ErrorResponse {
    error_response(Status::Unauthorized, PERMISSION_DENIED)
}

#[catch(404)]
fn not_found() -> ErrorResponse {
    error_response(Status::NotFound, "resource not found")
}

#[catch(422)]
fn unprocessable() -> ErrorResponse {
    error_response(Status::UnprocessableEntity, "invalid request payload")
}

#[catch(500)]
fn internal_error() -> ErrorResponse {
    error_response(Status::InternalServerError, "internal server error")
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request<'_>) -> ErrorResponse {
    error_response(status, status.reason().unwrap_or("request failed"))
}

/// JSON-envelope catchers. 401 never says why authentication failed.
pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        not_found,
        unprocessable,
        internal_error,
        default_catcher
    ]
}

fn cors_options() -> CorsOptions {
    CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let rocket = rocket::build()
        .attach(RequestLogger)
        .attach(TrackerDb::init())
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match TrackerDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match db::run_migrations(&pool).await {
                            Ok(()) => Ok(rocket),
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    log::error!("invalid auth configuration: {}", e);
                    return Err(rocket);
                }
            };
            let Some(db) = TrackerDb::fetch(&rocket) else {
                log::error!("database pool not available for the store");
                return Err(rocket);
            };
            let notifier = match EmailNotifier::new(&config.email) {
                Ok(notifier) => notifier,
                Err(e) => {
                    log::error!("invalid SMTP configuration: {}", e);
                    return Err(rocket);
                }
            };

            let store: SharedStore = Arc::new(Deadline::new(
                PgStore::new((**db).clone()),
                config.storage_timeout,
            ));
            match AuthState::new(config, store.clone(), Arc::new(notifier)) {
                Ok(state) => Ok(rocket.manage(store).manage(state)),
                Err(e) => {
                    log::error!("failed to initialise auth services: {}", e);
                    Err(rocket)
                }
            }
        }));

    let rocket = match cors_options().to_cors() {
        Ok(cors) => rocket.attach(cors),
        Err(e) => {
            log::error!("invalid CORS configuration: {}", e);
            rocket.attach(AdHoc::try_on_ignite("CORS", |rocket| async move {
                Err(rocket)
            }))
        }
    };

    rocket
        .register("/", catchers())
        .mount("/api/v1", api_routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Tracker API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, PgPool};

    use crate::auth::{AuthConfig, AuthState};
    use crate::notify::{RecordingNotifier, SharedNotifier};
    use crate::store::{MemoryStore, SharedStore};

    pub use database::{TestDatabase, TestDatabaseError};

    /// Signing secret shared by the HTTP integration tests.
    pub const TEST_JWT_SECRET: &str = "integration-test-secret-with-enough-bytes";

    /// Helpers for seeding rows directly in a test database.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert an identity row and return its id.
        pub async fn insert_user(&self, email: &str, password_hash: &str) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO users (email, first_name, last_name, password_hash) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(email)
            .bind("Test")
            .bind("User")
            .bind(password_hash)
            .fetch_one(self.pool)
            .await
        }

        pub async fn insert_project(&self, name: &str) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("INSERT INTO projects (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(self.pool)
                .await
        }

        pub async fn count_reset_tokens(&self) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_tokens")
                .fetch_one(self.pool)
                .await
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        use crate::db::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("neither TEST_DATABASE_URL nor TRACKER_TEST_CONTAINERS=1 is set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral, fully migrated database for one test.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Use `TEST_DATABASE_URL` when set, otherwise start a throwaway
            /// Postgres container if `TRACKER_TEST_CONTAINERS=1`.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
                    return Self::create(&url, None).await;
                }
                if std::env::var("TRACKER_TEST_CONTAINERS").as_deref() == Ok("1") {
                    return Self::with_container().await;
                }
                Err(TestDatabaseError::MissingUrl)
            }

            async fn with_container() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().start().await?;
                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
                Self::create(&url, Some(container)).await
            }

            async fn create(
                base_url: &str,
                container: Option<ContainerAsync<Postgres>>,
            ) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions = base_url.parse()?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql).execute(&admin_pool).await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ = drop_database_with_fallback(admin_options, &db_name).await;
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for Rocket instances used by the HTTP integration tests.
    ///
    /// Defaults to an in-memory store, a [`RecordingNotifier`] and a
    /// development [`AuthConfig`] signed with [`TEST_JWT_SECRET`].
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        config: AuthConfig,
        store: SharedStore,
        notifier: SharedNotifier,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                config: AuthConfig::development(TEST_JWT_SECRET),
                store: Arc::new(MemoryStore::new()),
                notifier: Arc::new(RecordingNotifier::new()),
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn with_store(mut self, store: SharedStore) -> Self {
            self.store = store;
            self
        }

        pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
            self.notifier = notifier;
            self
        }

        pub fn with_config(mut self, config: AuthConfig) -> Self {
            self.config = config;
            self
        }

        pub fn build(self) -> Rocket<Build> {
            let auth_state = AuthState::new(self.config, self.store.clone(), self.notifier)
                .expect("auth state for tests");

            let mut rocket = rocket::custom(self.figment)
                .register("/", crate::catchers())
                .manage(self.store)
                .manage(auth_state);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            rocket
        }

        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
