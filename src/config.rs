use crate::identity::{AuthState, Identity};
use std::{env, path::PathBuf};

const DEFAULT_DATA_PATH: &str = "data/state.json";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: PathBuf,
    pub port: u16,
    pub remote: Option<RemoteConfig>,
    pub identity: Identity,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_path = non_empty("APP_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));

        let port = non_empty("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let remote = match (non_empty("REMOTE_URL"), non_empty("REMOTE_API_KEY")) {
            (Some(url), Some(api_key)) => Some(RemoteConfig { url, api_key }),
            _ => None,
        };

        let auth = AuthState {
            user_id: non_empty("APP_USER_ID"),
            access_token: non_empty("APP_ACCESS_TOKEN"),
            is_guest: non_empty("APP_GUEST").is_some_and(|value| value == "1" || value == "true"),
            loading: false,
        };

        Self {
            data_path,
            port,
            remote,
            identity: auth.identity().unwrap_or(Identity::Guest),
        }
    }
}
