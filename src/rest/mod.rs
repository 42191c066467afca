//! REST request construction and submission

mod gateway;
mod route;

pub use gateway::RestGateway;
pub use route::ApiRoute;
