pub mod announcements;
pub mod attendance;
pub mod auth;
pub mod classes;
pub mod config;
pub mod courses;
pub mod err;
pub mod leave;
pub mod materials;
pub mod models;
pub mod schedules;
pub mod scope;
pub mod sections;
pub mod settings;
pub mod students;
pub mod submissions;
pub mod teachers;
pub mod week;

use axum::handler::Handler;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use tower::ServiceBuilder;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = AppConfig::from_env()?;
    err::set_debug(config.debug);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // retention housekeeping runs independently of request handling
    tokio::spawn(week::weekly_leave_cleanup(pool.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(pool, config);

    log::info!("Starting OpenAcademy HTTP Server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

fn router(pool: PgPool, config: AppConfig) -> Router {
    Router::new()
        .route("/", get(welcome))
        .nest("/api", api_router())
        .fallback(err::handler404.into_service())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(pool))
                .layer(Extension(config))
                .layer(middleware::from_fn(log_requests)),
        )
}

fn api_router() -> Router {
    Router::new()
        .nest(
            "/auth",
            Router::new()
                .route("/register", post(auth::register))
                .route("/login", post(auth::login))
                .route("/changePassword", post(auth::change_password)),
        )
        .nest(
            "/class",
            Router::new()
                .route("/add", post(classes::add_class))
                .route("/", get(classes::get_classes))
                .route(
                    "/:id",
                    get(classes::get_class_by_id)
                        .put(classes::update_class)
                        .delete(classes::delete_class),
                )
                .route("/:id/sections", get(classes::get_class_sections))
                .route("/:id/statistics", get(classes::get_class_statistics)),
        )
        .nest(
            "/section",
            Router::new()
                .route("/add", post(sections::add_section))
                .route("/", get(sections::get_sections))
                .route(
                    "/:id",
                    get(sections::get_section_by_id)
                        .put(sections::update_section)
                        .delete(sections::delete_section),
                )
                .route("/:id/statistics", get(sections::get_section_statistics))
                .route("/:id/students", get(sections::get_section_students)),
        )
        .nest(
            "/course",
            Router::new()
                .route("/add", post(courses::add_course))
                .route("/", get(courses::get_courses))
                .route(
                    "/:id",
                    get(courses::get_course_by_id)
                        .put(courses::update_course)
                        .delete(courses::delete_course),
                )
                .route(
                    "/instructor/:id",
                    get(courses::get_courses_by_instructor),
                )
                .route("/:id/schedules", get(courses::get_course_schedules)),
        )
        .nest(
            "/schedule",
            Router::new()
                .route("/", post(schedules::create_schedule))
                .route("/:id", get(schedules::get_schedule_detail)),
        )
        .nest(
            "/teacher",
            Router::new()
                .route("/", get(teachers::get_teachers))
                .route(
                    "/:id",
                    axum::routing::put(teachers::update_teacher).delete(teachers::delete_teacher),
                ),
        )
        .nest(
            "/student",
            Router::new()
                .route("/", get(students::get_students))
                .route(
                    "/:id",
                    axum::routing::put(students::update_student).delete(students::delete_student),
                ),
        )
        .nest(
            "/attendance",
            Router::new()
                .route("/mark", post(attendance::mark_attendance))
                .route("/schedule", get(attendance::get_attendance_for_schedule))
                .route("/student", get(attendance::get_student_attendance))
                .route("/students", get(attendance::get_students_for_schedule)),
        )
        .nest(
            "/leave",
            Router::new()
                .route(
                    "/student",
                    get(leave::get_student_leaves).post(leave::create_leave_request),
                )
                .route("/teacher", get(leave::get_teacher_leaves))
                .route("/:id/status", axum::routing::put(leave::update_leave_status)),
        )
        .nest(
            "/announcement",
            Router::new()
                .route(
                    "/",
                    post(announcements::create_announcement).get(announcements::get_announcements),
                )
                .route(
                    "/:id",
                    axum::routing::put(announcements::update_announcement)
                        .delete(announcements::delete_announcement),
                ),
        )
        .nest(
            "/course-material",
            Router::new()
                .route(
                    "/",
                    post(materials::upload_material).get(materials::list_materials),
                )
                .route("/:id", axum::routing::delete(materials::delete_material)),
        )
        .nest(
            "/submission",
            Router::new()
                .route("/", post(submissions::create_submission))
                .route("/teacher", get(submissions::list_teacher_submissions))
                .route("/student", get(submissions::list_student_submissions))
                .route("/:id/uploads", get(submissions::get_submission_uploads))
                .route(
                    "/:id/upload",
                    post(submissions::upload_student_submission)
                        .get(submissions::get_own_submission_upload),
                ),
        )
        .nest(
            "/settings",
            Router::new()
                .route(
                    "/portal",
                    get(settings::get_portal_settings).put(settings::update_portal_settings),
                )
                .route("/features", get(settings::get_portal_features)),
        )
}

async fn welcome() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the OpenAcademy API" }))
}

async fn log_requests<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    log::debug!("http request | start: {} {}", method, uri);
    let response = next.run(req).await;
    log::debug!(
        "http request | complete: {} {} -> {}",
        method,
        uri,
        response.status()
    );
    response
}
