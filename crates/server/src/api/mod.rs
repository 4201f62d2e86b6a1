pub mod courses;
pub mod handlers;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod workspaces;

pub use routes::create_router;
