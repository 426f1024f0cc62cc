pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
