use crate::errors::RemoteError;
use crate::models::{Counter, CounterUpdate, DailyStats, NewCounter, Session, SyncSnapshot};
use crate::stats::{add_signed, day_key, next_day};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method, RequestBuilder,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

pub type Result<T> = std::result::Result<T, RemoteError>;

pub const SESSION_SYNC_LIMIT: usize = 100;
pub const STATS_SYNC_LIMIT: usize = 90;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_counters(&self, user_id: &str) -> Result<Vec<Counter>>;
    async fn fetch_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<Session>>;
    async fn fetch_stats(&self, user_id: &str, limit: usize) -> Result<Vec<DailyStats>>;

    async fn insert_counter(&self, counter: &NewCounter, user_id: &str) -> Result<Counter>;
    async fn update_counter(&self, id: &str, update: &CounterUpdate) -> Result<()>;
    async fn delete_counter(&self, id: &str) -> Result<()>;

    async fn insert_session(&self, session: &Session) -> Result<()>;
    async fn delete_session(&self, id: &str) -> Result<()>;

    /// The aggregate row with `day <= date < next_day`, if any.
    async fn find_stat(&self, user_id: &str, day: &str, next_day: &str)
    -> Result<Option<DailyStats>>;
    async fn insert_stat(&self, user_id: &str, total_count: u64, date: &str) -> Result<()>;
    async fn update_stat_total(&self, id: &str, total_count: u64) -> Result<()>;
    async fn delete_stat(&self, id: &str) -> Result<()>;
}

/// PostgREST-style hosted backend (`/rest/v1/<table>`).
#[derive(Debug, Clone)]
pub struct RestRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestRemote {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| RemoteError::api(0, "invalid api key format"))?;
        headers.insert("apikey", api_key);

        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        let auth_value = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|_| RemoteError::api(0, "invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        let url = format!("{}/rest/v1/{table}", self.base_url);
        Ok(self.client.request(method, url).headers(self.headers()?))
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::api(status.as_u16(), body))
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.text().await?;
        debug!("remote response: {body}");
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn fetch_counters(&self, user_id: &str) -> Result<Vec<Counter>> {
        let builder = self.request(Method::GET, "counters")?.query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.asc".to_string()),
        ]);
        Self::parse(Self::send(builder).await?).await
    }

    async fn fetch_sessions(&self, _user_id: &str, limit: usize) -> Result<Vec<Session>> {
        // Sessions carry no owner column; row-level security scopes them to the token.
        let builder = self.request(Method::GET, "sessions")?.query(&[
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Self::parse(Self::send(builder).await?).await
    }

    async fn fetch_stats(&self, user_id: &str, limit: usize) -> Result<Vec<DailyStats>> {
        let builder = self.request(Method::GET, "daily_stats")?.query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "date.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Self::parse(Self::send(builder).await?).await
    }

    async fn insert_counter(&self, counter: &NewCounter, user_id: &str) -> Result<Counter> {
        let mut row = json!({
            "name": counter.name,
            "color": counter.color,
            "icon": counter.icon,
            "user_id": user_id,
        });
        if let Some(id) = &counter.id {
            row["id"] = json!(id);
        }
        let builder = self
            .request(Method::POST, "counters")?
            .header("Prefer", "return=representation")
            .json(&[row]);
        let response = Self::send(builder).await?;
        let status = response.status().as_u16();
        let mut rows: Vec<Counter> = Self::parse(response).await?;
        if rows.is_empty() {
            return Err(RemoteError::api(status, "insert returned no counter"));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update_counter(&self, id: &str, update: &CounterUpdate) -> Result<()> {
        let builder = self
            .request(Method::PATCH, "counters")?
            .query(&[("id", format!("eq.{id}"))])
            .json(update);
        Self::send(builder).await?;
        Ok(())
    }

    async fn delete_counter(&self, id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, "counters")?
            .query(&[("id", format!("eq.{id}"))]);
        Self::send(builder).await?;
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let row = json!({
            "id": session.id,
            "counter_id": session.counter_id,
            "count": session.count,
            "goal": session.goal,
            "completed": session.completed,
            "date": session.date,
        });
        let builder = self.request(Method::POST, "sessions")?.json(&[row]);
        Self::send(builder).await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, "sessions")?
            .query(&[("id", format!("eq.{id}"))]);
        Self::send(builder).await?;
        Ok(())
    }

    async fn find_stat(
        &self,
        user_id: &str,
        day: &str,
        next_day: &str,
    ) -> Result<Option<DailyStats>> {
        let builder = self.request(Method::GET, "daily_stats")?.query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("date", format!("gte.{day}")),
            ("date", format!("lt.{next_day}")),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<DailyStats> = Self::parse(Self::send(builder).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_stat(&self, user_id: &str, total_count: u64, date: &str) -> Result<()> {
        let row = json!({
            "user_id": user_id,
            "total_count": total_count,
            "date": date,
        });
        let builder = self.request(Method::POST, "daily_stats")?.json(&[row]);
        Self::send(builder).await?;
        Ok(())
    }

    async fn update_stat_total(&self, id: &str, total_count: u64) -> Result<()> {
        let builder = self
            .request(Method::PATCH, "daily_stats")?
            .query(&[("id", format!("eq.{id}"))])
            .json(&json!({ "total_count": total_count }));
        Self::send(builder).await?;
        Ok(())
    }

    async fn delete_stat(&self, id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, "daily_stats")?
            .query(&[("id", format!("eq.{id}"))]);
        Self::send(builder).await?;
        Ok(())
    }
}

fn logged<T>(what: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!("remote {what} failed: {err}");
            None
        }
    }
}

/// Best-effort facade over a `RemoteStore`.
#[derive(Clone)]
pub struct RemoteAdapter {
    store: Arc<dyn RemoteStore>,
}

impl RemoteAdapter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Reads counters, sessions and stats concurrently. A failed read yields an
    /// empty list; only a sync where every read failed is an error.
    pub async fn sync(&self, user_id: &str) -> Result<SyncSnapshot> {
        let (counters, sessions, stats) = tokio::join!(
            self.store.fetch_counters(user_id),
            self.store.fetch_sessions(user_id, SESSION_SYNC_LIMIT),
            self.store.fetch_stats(user_id, STATS_SYNC_LIMIT),
        );

        if counters.is_err() && sessions.is_err() && stats.is_err() {
            logged("counter fetch", counters);
            logged("session fetch", sessions);
            logged("stats fetch", stats);
            return Err(RemoteError::SyncFailed);
        }

        Ok(SyncSnapshot {
            counters: logged("counter fetch", counters).unwrap_or_default(),
            sessions: logged("session fetch", sessions).unwrap_or_default(),
            stats: logged("stats fetch", stats).unwrap_or_default(),
        })
    }

    pub async fn create_counter(&self, counter: &NewCounter, user_id: &str) -> Option<Counter> {
        logged("counter insert", self.store.insert_counter(counter, user_id).await)
    }

    pub async fn update_counter(&self, id: &str, update: &CounterUpdate) -> bool {
        logged("counter update", self.store.update_counter(id, update).await).is_some()
    }

    pub async fn delete_counter(&self, id: &str) -> bool {
        logged("counter delete", self.store.delete_counter(id).await).is_some()
    }

    pub async fn create_session(&self, session: &Session) -> bool {
        logged("session insert", self.store.insert_session(session).await).is_some()
    }

    pub async fn delete_session(&self, id: &str) -> bool {
        logged("session delete", self.store.delete_session(id).await).is_some()
    }

    /// Adds `total_count` to the row for the day of `date`, inserting it when
    /// the day has none yet.
    pub async fn upsert_daily_stat(&self, total_count: u64, date: &str, user_id: &str) -> bool {
        let Some((day, next)) = day_window(date) else {
            return false;
        };
        let Some(existing) = logged("stat lookup", self.store.find_stat(user_id, day, &next).await)
        else {
            return false;
        };

        let result = match existing {
            Some(stat) => {
                self.store
                    .update_stat_total(&stat.id, stat.total_count.saturating_add(total_count))
                    .await
            }
            None => self.store.insert_stat(user_id, total_count, day).await,
        };
        logged("stat upsert", result).is_some()
    }

    /// Adds a signed `delta` to the row for the day of `date`, deleting it once
    /// the total reaches zero. A day without a row is left alone.
    pub async fn adjust_daily_stat(&self, date: &str, delta: i64, user_id: &str) -> bool {
        let Some((day, next)) = day_window(date) else {
            return false;
        };
        let Some(existing) = logged("stat lookup", self.store.find_stat(user_id, day, &next).await)
        else {
            return false;
        };
        let Some(stat) = existing else {
            return true;
        };

        let total = add_signed(stat.total_count, delta);
        let result = if total == 0 {
            self.store.delete_stat(&stat.id).await
        } else {
            self.store.update_stat_total(&stat.id, total).await
        };
        logged("stat adjust", result).is_some()
    }
}

fn day_window(date: &str) -> Option<(&str, String)> {
    let day = day_key(date);
    match next_day(day) {
        Some(next) => Some((day, next)),
        None => {
            warn!("cannot derive a day window from date {date:?}");
            None
        }
    }
}

enum RemoteJob {
    CreateCounter {
        counter: NewCounter,
        user_id: String,
        reply: Option<oneshot::Sender<Option<Counter>>>,
    },
    UpdateCounter {
        id: String,
        update: CounterUpdate,
        reply: oneshot::Sender<bool>,
    },
    DeleteCounter {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    CreateSession {
        session: Session,
    },
    DeleteSession {
        id: String,
    },
    UpsertDailyStat {
        total_count: u64,
        date: String,
        user_id: String,
    },
    AdjustDailyStat {
        date: String,
        delta: i64,
        user_id: String,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

async fn run_job(adapter: &RemoteAdapter, job: RemoteJob) {
    match job {
        RemoteJob::CreateCounter {
            counter,
            user_id,
            reply,
        } => {
            let created = adapter.create_counter(&counter, &user_id).await;
            if let Some(reply) = reply {
                let _ = reply.send(created);
            }
        }
        RemoteJob::UpdateCounter { id, update, reply } => {
            let _ = reply.send(adapter.update_counter(&id, &update).await);
        }
        RemoteJob::DeleteCounter { id, reply } => {
            let _ = reply.send(adapter.delete_counter(&id).await);
        }
        RemoteJob::CreateSession { session } => {
            adapter.create_session(&session).await;
        }
        RemoteJob::DeleteSession { id } => {
            adapter.delete_session(&id).await;
        }
        RemoteJob::UpsertDailyStat {
            total_count,
            date,
            user_id,
        } => {
            adapter.upsert_daily_stat(total_count, &date, &user_id).await;
        }
        RemoteJob::AdjustDailyStat {
            date,
            delta,
            user_id,
        } => {
            adapter.adjust_daily_stat(&date, delta, &user_id).await;
        }
        RemoteJob::Flush { reply } => {
            let _ = reply.send(());
        }
    }
}

/// Handle to the background task that applies remote writes in issue order.
#[derive(Clone)]
pub struct RemoteWriter {
    tx: mpsc::UnboundedSender<RemoteJob>,
}

/// Spawns the remote writer task. Must be called inside a tokio runtime.
pub fn spawn_remote_writer(adapter: RemoteAdapter) -> RemoteWriter {
    let (tx, mut rx) = mpsc::unbounded_channel::<RemoteJob>();

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            run_job(&adapter, job).await;
        }
        debug!("remote writer stopped");
    });

    RemoteWriter { tx }
}

impl RemoteWriter {
    fn dispatch(&self, job: RemoteJob) -> bool {
        if self.tx.send(job).is_err() {
            warn!("remote writer is gone; dropping write");
            return false;
        }
        true
    }

    /// Creates a counter and waits for the stored row.
    pub async fn create_counter(&self, counter: NewCounter, user_id: &str) -> Option<Counter> {
        let (reply, rx) = oneshot::channel();
        let job = RemoteJob::CreateCounter {
            counter,
            user_id: user_id.to_string(),
            reply: Some(reply),
        };
        if !self.dispatch(job) {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub fn push_counter(&self, counter: NewCounter, user_id: &str) {
        self.dispatch(RemoteJob::CreateCounter {
            counter,
            user_id: user_id.to_string(),
            reply: None,
        });
    }

    pub async fn update_counter(&self, id: &str, update: CounterUpdate) -> bool {
        let (reply, rx) = oneshot::channel();
        let job = RemoteJob::UpdateCounter {
            id: id.to_string(),
            update,
            reply,
        };
        self.dispatch(job) && rx.await.unwrap_or(false)
    }

    pub async fn delete_counter(&self, id: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let job = RemoteJob::DeleteCounter {
            id: id.to_string(),
            reply,
        };
        self.dispatch(job) && rx.await.unwrap_or(false)
    }

    pub fn create_session(&self, session: Session) {
        self.dispatch(RemoteJob::CreateSession { session });
    }

    pub fn delete_session(&self, id: &str) {
        self.dispatch(RemoteJob::DeleteSession { id: id.to_string() });
    }

    pub fn upsert_daily_stat(&self, total_count: u64, date: &str, user_id: &str) {
        self.dispatch(RemoteJob::UpsertDailyStat {
            total_count,
            date: date.to_string(),
            user_id: user_id.to_string(),
        });
    }

    pub fn adjust_daily_stat(&self, date: &str, delta: i64, user_id: &str) {
        self.dispatch(RemoteJob::AdjustDailyStat {
            date: date.to_string(),
            delta,
            user_id: user_id.to_string(),
        });
    }

    /// Waits until every write queued before this call has been applied.
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.dispatch(RemoteJob::Flush { reply }) {
            let _ = rx.await;
        }
    }
}
