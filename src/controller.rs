use crate::errors::TallyError;
use crate::identity::Identity;
use crate::models::{
    Counter, CounterUpdate, DailyStats, NewCounter, NewSession, Session, StatsSummary,
    SyncSnapshot,
};
use crate::remote::{spawn_remote_writer, RemoteAdapter, RemoteWriter};
use crate::stats::{apply_delta, build_summary, day_key, next_day, timestamp_now, DayChange};
use crate::storage::LocalStore;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TallyError>;

/// Remote half of a counter change, run while the controller is not borrowed.
pub struct CounterSync {
    writer: RemoteWriter,
    user_id: String,
}

impl CounterSync {
    pub async fn create(&self, input: NewCounter) -> Option<Counter> {
        self.writer.create_counter(input, &self.user_id).await
    }

    pub async fn update(&self, id: &str, update: CounterUpdate) -> bool {
        self.writer.update_counter(id, update).await
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.writer.delete_counter(id).await
    }
}

pub struct SessionController {
    local: LocalStore,
    remote: Option<RemoteAdapter>,
    writer: Option<RemoteWriter>,
    identity: Identity,
    counters: Vec<Counter>,
    sessions: Vec<Session>,
    stats: Vec<DailyStats>,
    active_counter: Option<Counter>,
    current_count: u64,
    current_goal: Option<u64>,
    /// Unsaved progress of counters switched away from during this run.
    parked: HashMap<String, (u64, Option<u64>)>,
    syncing: bool,
    sound_enabled: bool,
    haptics_enabled: bool,
}

impl SessionController {
    /// Must run inside a tokio runtime when `remote` is set.
    pub fn new(local: LocalStore, remote: Option<RemoteAdapter>) -> Self {
        let writer = remote.clone().map(spawn_remote_writer);
        Self {
            local,
            remote,
            writer,
            identity: Identity::Guest,
            counters: Vec::new(),
            sessions: Vec::new(),
            stats: Vec::new(),
            active_counter: None,
            current_count: 0,
            current_goal: None,
            parked: HashMap::new(),
            syncing: false,
            sound_enabled: true,
            haptics_enabled: true,
        }
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    pub fn active_counter(&self) -> Option<&Counter> {
        self.active_counter.as_ref()
    }

    pub fn current_count(&self) -> u64 {
        self.current_count
    }

    pub fn current_goal(&self) -> Option<u64> {
        self.current_goal
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn stats(&self) -> &[DailyStats] {
        &self.stats
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn syncing(&self) -> bool {
        self.syncing
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn haptics_enabled(&self) -> bool {
        self.haptics_enabled
    }

    pub fn toggle_sound(&mut self) -> bool {
        self.sound_enabled = !self.sound_enabled;
        self.sound_enabled
    }

    pub fn toggle_haptics(&mut self) -> bool {
        self.haptics_enabled = !self.haptics_enabled;
        self.haptics_enabled
    }

    pub fn dark_mode(&self) -> bool {
        self.local.dark_mode()
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<()> {
        Ok(self.local.set_dark_mode(enabled)?)
    }

    pub fn summary(&self) -> StatsSummary {
        build_summary(&self.sessions, &self.counters)
    }

    pub async fn flush_remote(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    fn remote_user(&self) -> Option<(RemoteWriter, String)> {
        let user_id = self.identity.user_id()?;
        let writer = self.writer.clone()?;
        Some((writer, user_id.to_string()))
    }

    pub async fn initialize(&mut self, identity: Identity) -> Result<()> {
        self.syncing = true;
        self.identity = identity;
        self.parked.clear();
        let result = self.load().await;
        self.syncing = false;
        result
    }

    async fn load(&mut self) -> Result<()> {
        let Some(user_id) = self.identity.user_id().map(str::to_string) else {
            return self.load_local();
        };
        let Some(remote) = self.remote.clone() else {
            warn!("no remote store configured, using local data");
            return self.load_local();
        };

        match remote.sync(&user_id).await {
            Ok(snapshot) => self.adopt_snapshot(snapshot, &user_id),
            Err(err) => {
                warn!("remote sync failed, using local data: {err}");
                self.load_local()
            }
        }
    }

    fn adopt_snapshot(&mut self, snapshot: SyncSnapshot, user_id: &str) -> Result<()> {
        if snapshot.counters.is_empty() {
            self.counters = self.local.seed_default_counters()?;
            if let Some(writer) = &self.writer {
                for counter in &self.counters {
                    writer.push_counter(
                        NewCounter {
                            id: Some(counter.id.clone()),
                            name: counter.name.clone(),
                            color: counter.color.clone(),
                            icon: counter.icon.clone(),
                        },
                        user_id,
                    );
                }
            }
        } else {
            self.local.save_counters(&snapshot.counters)?;
            self.counters = snapshot.counters;
        }

        self.local.save_sessions(&snapshot.sessions)?;
        self.sessions = snapshot.sessions;
        self.local.save_stats(&snapshot.stats)?;
        self.stats = snapshot.stats;

        info!(
            counters = self.counters.len(),
            sessions = self.sessions.len(),
            "adopted remote data"
        );
        self.activate_first();
        Ok(())
    }

    fn load_local(&mut self) -> Result<()> {
        let mut counters = self.local.counters();
        if counters.is_empty() {
            counters = self.local.seed_default_counters()?;
        }
        self.counters = counters;
        self.sessions = self.local.sessions();
        self.stats = self.local.stats();

        info!(
            counters = self.counters.len(),
            sessions = self.sessions.len(),
            "loaded local data"
        );
        self.activate_first();
        Ok(())
    }

    fn activate_first(&mut self) {
        self.active_counter = self.counters.first().cloned();
        let restored = self
            .active_counter
            .as_ref()
            .and_then(|counter| self.local.active_session(&counter.id));
        (self.current_count, self.current_goal) =
            restored.map_or((0, None), |session| (session.count, session.goal));
    }

    pub fn switch_active_counter(&mut self, counter_id: &str) -> Result<&Counter> {
        let counter = self
            .counters
            .iter()
            .find(|counter| counter.id == counter_id)
            .cloned()
            .ok_or_else(|| TallyError::UnknownCounter(counter_id.to_string()))?;
        self.switch_to(counter)?;
        self.active_counter.as_ref().ok_or(TallyError::NoActiveCounter)
    }

    fn switch_to(&mut self, counter: Counter) -> Result<()> {
        if let Some(active) = &self.active_counter {
            let state = (self.current_count, self.current_goal);
            // An empty tally has nothing to save and must not evict another
            // counter's progress from the single slot.
            if state != (0, None) {
                self.local.save_active_session(&active.id, state.0, state.1)?;
                self.parked.insert(active.id.clone(), state);
            } else {
                self.parked.remove(&active.id);
            }
        }

        let restored = self.parked.get(&counter.id).copied().or_else(|| {
            self.local
                .active_session(&counter.id)
                .map(|session| (session.count, session.goal))
        });
        (self.current_count, self.current_goal) = restored.unwrap_or((0, None));
        debug!(counter = %counter.id, count = self.current_count, "switched counter");
        self.active_counter = Some(counter);
        Ok(())
    }

    pub fn increment(&mut self) -> Result<u64> {
        let active = self.active_counter.as_ref().ok_or(TallyError::NoActiveCounter)?;
        let count = self.current_count.saturating_add(1);
        self.local.save_active_session(&active.id, count, self.current_goal)?;
        self.current_count = count;
        Ok(count)
    }

    /// A goal of zero is the same as no goal.
    pub fn set_goal(&mut self, goal: Option<u64>) -> Result<()> {
        let active = self.active_counter.as_ref().ok_or(TallyError::NoActiveCounter)?;
        let goal = goal.filter(|goal| *goal > 0);
        self.local.save_active_session(&active.id, self.current_count, goal)?;
        self.current_goal = goal;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.current_count = 0;
        self.current_goal = None;
        if let Some(active) = &self.active_counter {
            self.parked.remove(&active.id);
            self.local.clear_active_session()?;
        }
        Ok(())
    }

    pub fn complete_session(&mut self) -> Result<Option<Session>> {
        let Some(active) = &self.active_counter else {
            return Ok(None);
        };
        if self.current_count == 0 {
            return Err(TallyError::EmptySession);
        }

        let now = timestamp_now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            counter_id: active.id.clone(),
            count: self.current_count,
            goal: self.current_goal,
            completed: self
                .current_goal
                .is_some_and(|goal| self.current_count >= goal),
            date: now.clone(),
            created_at: now,
        };

        self.record_session(session.clone())?;
        self.reset()?;
        info!(count = session.count, completed = session.completed, "session completed");
        Ok(Some(session))
    }

    /// Records a session entered by hand. The in-progress tally is untouched.
    pub fn save_session_manually(&mut self, input: NewSession) -> Result<Session> {
        if input.count == 0 || i64::try_from(input.count).is_err() {
            return Err(TallyError::InvalidCount);
        }
        if next_day(day_key(&input.date)).is_none() {
            return Err(TallyError::InvalidDate(input.date));
        }
        if !self.has_counter(&input.counter_id) {
            return Err(TallyError::UnknownCounter(input.counter_id));
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            counter_id: input.counter_id,
            count: input.count,
            goal: input.goal,
            completed: input.completed,
            date: input.date,
            created_at: timestamp_now(),
        };
        self.record_session(session.clone())?;
        Ok(session)
    }

    fn record_session(&mut self, session: Session) -> Result<()> {
        let delta = i64::try_from(session.count).map_err(|_| TallyError::InvalidCount)?;
        self.sessions.insert(0, session.clone());
        self.local.save_sessions(&self.sessions)?;

        let date = session.date.clone();
        if let Some((writer, _)) = self.remote_user() {
            writer.create_session(session);
        }
        self.fold_into_stats(&date, delta)
    }

    pub fn delete_session(&mut self, id: &str) -> Result<Option<Session>> {
        let Some(index) = self.sessions.iter().position(|session| session.id == id) else {
            return Ok(None);
        };
        let session = self.sessions.remove(index);
        self.local.save_sessions(&self.sessions)?;

        if let Some((writer, _)) = self.remote_user() {
            writer.delete_session(&session.id);
        }
        let delta = i64::try_from(session.count).unwrap_or(i64::MAX);
        self.fold_into_stats(&session.date, -delta)?;
        Ok(Some(session))
    }

    fn fold_into_stats(&mut self, date: &str, delta: i64) -> Result<()> {
        let day = day_key(date);
        let change = apply_delta(&mut self.stats, day, delta);
        let remote = self.remote_user();

        if change == DayChange::Inserted {
            if let Some((_, user_id)) = &remote {
                self.stats[0].user_id = Some(user_id.clone());
            }
        }
        if change != DayChange::Unchanged {
            self.local.save_stats(&self.stats)?;
        }

        if let Some((writer, user_id)) = remote {
            if delta > 0 {
                writer.upsert_daily_stat(delta.unsigned_abs(), date, &user_id);
            } else {
                writer.adjust_daily_stat(date, delta, &user_id);
            }
        }
        debug!(day, delta, ?change, "folded session into daily stats");
        Ok(())
    }

    pub fn counter_sync(&self) -> Option<CounterSync> {
        self.remote_user().map(|(writer, user_id)| CounterSync { writer, user_id })
    }

    pub fn check_new_counter(&self, input: &NewCounter) -> Result<()> {
        if input.name.trim().is_empty() {
            return Err(TallyError::EmptyName);
        }
        match &input.id {
            Some(id) if self.has_counter(id) => Err(TallyError::DuplicateCounter(id.clone())),
            _ => Ok(()),
        }
    }

    /// `created` is the server's row, if the remote create succeeded.
    pub fn insert_counter(
        &mut self,
        input: NewCounter,
        created: Option<Counter>,
    ) -> Result<Counter> {
        self.check_new_counter(&input)?;
        let counter = created.unwrap_or_else(|| Counter {
            id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: None,
            name: input.name,
            color: input.color,
            icon: input.icon,
            created_at: timestamp_now(),
        });
        if self.has_counter(&counter.id) {
            return Err(TallyError::DuplicateCounter(counter.id));
        }

        self.counters.push(counter.clone());
        self.local.save_counters(&self.counters)?;
        Ok(counter)
    }

    pub async fn add_counter(&mut self, input: NewCounter) -> Result<Counter> {
        self.check_new_counter(&input)?;
        let created = match self.counter_sync() {
            Some(sync) => sync.create(input.clone()).await,
            None => None,
        };
        self.insert_counter(input, created)
    }

    pub fn check_counter_update(&self, id: &str, update: &CounterUpdate) -> Result<()> {
        if !self.has_counter(id) {
            return Err(TallyError::UnknownCounter(id.to_string()));
        }
        if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(TallyError::EmptyName);
        }
        Ok(())
    }

    pub fn apply_counter_update(&mut self, id: &str, update: &CounterUpdate) -> Result<Counter> {
        self.check_counter_update(id, update)?;
        let counter = self
            .counters
            .iter_mut()
            .find(|counter| counter.id == id)
            .ok_or_else(|| TallyError::UnknownCounter(id.to_string()))?;
        counter.apply(update);
        let updated = counter.clone();
        self.local.save_counters(&self.counters)?;

        if self.active_counter.as_ref().is_some_and(|active| active.id == id) {
            self.active_counter = Some(updated.clone());
        }
        Ok(updated)
    }

    pub async fn update_counter(&mut self, id: &str, update: CounterUpdate) -> Result<Counter> {
        self.check_counter_update(id, &update)?;
        if let Some(sync) = self.counter_sync() {
            sync.update(id, update.clone()).await;
        }
        self.apply_counter_update(id, &update)
    }

    /// The last remaining counter cannot be deleted.
    pub fn check_counter_delete(&self, id: &str) -> Result<()> {
        if !self.has_counter(id) {
            return Err(TallyError::UnknownCounter(id.to_string()));
        }
        if self.counters.len() <= 1 {
            return Err(TallyError::LastCounter);
        }
        Ok(())
    }

    pub fn remove_counter(&mut self, id: &str) -> Result<()> {
        self.check_counter_delete(id)?;
        self.counters.retain(|counter| counter.id != id);
        self.local.save_counters(&self.counters)?;
        self.parked.remove(id);
        if self.local.active_session(id).is_some() {
            self.local.clear_active_session()?;
        }

        if self.active_counter.as_ref().is_some_and(|active| active.id == id) {
            self.active_counter = None;
            self.current_count = 0;
            self.current_goal = None;
            if let Some(first) = self.counters.first().cloned() {
                self.switch_to(first)?;
            }
        }
        Ok(())
    }

    pub async fn delete_counter(&mut self, id: &str) -> Result<()> {
        self.check_counter_delete(id)?;
        if let Some(sync) = self.counter_sync() {
            sync.delete(id).await;
        }
        self.remove_counter(id)
    }

    fn has_counter(&self, id: &str) -> bool {
        self.counters.iter().any(|counter| counter.id == id)
    }
}
