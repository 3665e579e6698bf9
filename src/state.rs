use crate::controller::SessionController;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Mutex<SessionController>>,
}

impl AppState {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
        }
    }
}
