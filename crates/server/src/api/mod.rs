pub mod handlers;
pub mod matching;
pub mod middleware;
pub mod routes;
pub mod terms;

pub use routes::create_router;
