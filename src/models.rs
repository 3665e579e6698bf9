use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub created_at: String,
}

impl Counter {
    pub fn apply(&mut self, update: &CounterUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(color) = &update.color {
            self.color = color.clone();
        }
        if let Some(icon) = &update.icon {
            self.icon = icon.clone();
        }
    }
}

/// Counter fields supplied by the user. `id` never comes from a request body;
/// it is only set for seeded defaults pushed to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCounter {
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl CounterUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none() && self.icon.is_none()
    }
}

/// A committed counting run. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub counter_id: String,
    pub count: u64,
    pub goal: Option<u64>,
    pub completed: bool,
    pub date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub counter_id: String,
    pub count: u64,
    #[serde(default)]
    pub goal: Option<u64>,
    #[serde(default)]
    pub completed: bool,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub total_count: u64,
    pub date: String,
    pub created_at: String,
}

/// In-progress tally for the most recently active counter. Local only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub counter_id: String,
    pub count: u64,
    pub goal: Option<u64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub counters: Vec<Counter>,
    pub sessions: Vec<Session>,
    pub stats: Vec<DailyStats>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub counters: Vec<Counter>,
    pub active_counter: Option<Counter>,
    pub current_count: u64,
    pub current_goal: Option<u64>,
    pub syncing: bool,
    pub sound_enabled: bool,
    pub haptics_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct GoalRequest {
    pub goal: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveCounterRequest {
    pub counter_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Preferences {
    pub dark_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct RecentSession {
    pub id: String,
    pub counter_name: String,
    pub count: u64,
    pub goal: Option<u64>,
    pub completed: bool,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub last_7_days: Vec<DailyPoint>,
    pub today_count: u64,
    pub total_count: u64,
    pub session_count: usize,
    pub active_days: usize,
    pub recent_sessions: Vec<RecentSession>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub daily: Vec<DailyStats>,
    pub summary: StatsSummary,
}
