pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod utils;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use lifecycle::RideLifecycle;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub lifecycle: RideLifecycle,
}
