pub mod app;
pub mod config;
pub mod controller;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod remote;
pub mod state;
pub mod stats;
pub mod storage;

pub use app::router;
pub use config::Config;
pub use controller::SessionController;
pub use state::AppState;
