use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use super::{courses, handlers, middleware::metrics_middleware, queue, workspaces};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let content_root = state.content_root();

    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Courses (platform token forwarded)
        .route("/courses", get(courses::list_courses))
        .route("/courses/migrate", post(courses::migrate_course))
        .route("/courses/{id}/lessons", get(courses::get_course_lessons))
        // Migration status
        .route("/workspaces/{ws}/status", get(workspaces::workspace_status))
        .route(
            "/workspaces/{ws}/migrations/{course}/cancel",
            post(workspaces::cancel_migration),
        )
        // Queue administration
        .route("/queue", get(queue::queue_status))
        .route("/queue/cancel-all", post(queue::cancel_all))
        .with_state(state);

    let mut router = Router::new().nest("/api/v1", api_routes);

    // Uploaded objects, when the bucket is a local directory
    if let Some(root) = content_root {
        router = router.nest_service("/content", ServeDir::new(root));
    }

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
