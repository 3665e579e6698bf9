use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct Counter {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    counters: Vec<Counter>,
    active_counter: Option<Counter>,
    current_count: u64,
    current_goal: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Session {
    id: String,
    count: u64,
    goal: Option<u64>,
    completed: bool,
    date: String,
}

#[derive(Debug, Deserialize)]
struct DailyStats {
    total_count: u64,
    date: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    daily: Vec<DailyStats>,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("tasbeeh_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/state")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let data_path = unique_data_path();
    let child = Command::new(env!("CARGO_BIN_EXE_tasbeeh_counter"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env("APP_GUEST", "1")
        .env_remove("REMOTE_URL")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn state(client: &Client, base_url: &str) -> StateResponse {
    client
        .get(format!("{base_url}/api/state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn post(client: &Client, url: String) -> reqwest::Response {
    client.post(url).send().await.unwrap()
}

async fn daily(client: &Client, base_url: &str) -> Vec<DailyStats> {
    let stats: StatsResponse = client
        .get(format!("{base_url}/api/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    stats.daily
}

#[tokio::test]
async fn http_increment_then_complete_records_session() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let base = &server.base_url;

    post(&client, format!("{base}/api/reset")).await;
    let response = client
        .post(format!("{base}/api/goal"))
        .json(&json!({ "goal": 3 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    for _ in 0..3 {
        assert!(post(&client, format!("{base}/api/increment")).await.status().is_success());
    }
    let current = state(&client, base).await;
    assert_eq!(current.current_count, 3);
    assert_eq!(current.current_goal, Some(3));

    let session: Session = post(&client, format!("{base}/api/complete"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session.count, 3);
    assert_eq!(session.goal, Some(3));
    assert!(session.completed);

    let after = state(&client, base).await;
    assert_eq!((after.current_count, after.current_goal), (0, None));

    let day = &session.date[..10];
    let today = daily(&client, base).await;
    let row = today.iter().find(|s| s.date.starts_with(day)).expect("row for today");
    assert!(row.total_count >= 3);

    let empty = post(&client, format!("{base}/api/complete")).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_manual_session_folds_into_its_day() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let base = &server.base_url;

    let counter_id = state(&client, base).await.counters[0].id.clone();
    let response = client
        .post(format!("{base}/api/sessions"))
        .json(&json!({
            "counter_id": counter_id,
            "count": 5,
            "goal": null,
            "completed": true,
            "date": "2020-02-29T10:00:00.000Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session: Session = response.json().await.unwrap();
    assert_eq!(session.date, "2020-02-29T10:00:00.000Z");
    assert!(session.completed);

    let row = daily(&client, base)
        .await
        .into_iter()
        .find(|s| s.date.starts_with("2020-02-29"))
        .expect("row for the manual day");
    assert_eq!(row.total_count, 5);

    let deleted = client
        .delete(format!("{base}/api/sessions/{}", session.id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert!(!daily(&client, base)
        .await
        .iter()
        .any(|s| s.date.starts_with("2020-02-29")));

    let again = client
        .delete(format!("{base}/api/sessions/{}", session.id))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_switching_counters_keeps_progress() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let base = &server.base_url;

    let added: Counter = client
        .post(format!("{base}/api/counters"))
        .json(&json!({ "name": "سبحان الله وبحمده", "color": "green", "icon": "leaf" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let first = state(&client, base).await.counters[0].id.clone();
    client
        .post(format!("{base}/api/active"))
        .json(&json!({ "counter_id": first }))
        .send()
        .await
        .unwrap();
    post(&client, format!("{base}/api/reset")).await;
    post(&client, format!("{base}/api/increment")).await;
    post(&client, format!("{base}/api/increment")).await;

    let switched: StateResponse = client
        .post(format!("{base}/api/active"))
        .json(&json!({ "counter_id": added.id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(switched.active_counter.unwrap().id, added.id);
    assert_eq!(switched.current_count, 0);

    let back: StateResponse = client
        .post(format!("{base}/api/active"))
        .json(&json!({ "counter_id": first }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(back.current_count, 2);
    post(&client, format!("{base}/api/reset")).await;
}

#[tokio::test]
async fn http_last_counter_cannot_be_deleted() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let base = &server.base_url;

    let counters = state(&client, base).await.counters;
    let (last, rest) = counters.split_last().expect("at least one counter");
    for counter in rest {
        let response = client
            .delete(format!("{base}/api/counters/{}", counter.id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = client
        .delete(format!("{base}/api/counters/{}", last.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let remaining = state(&client, base).await;
    assert_eq!(remaining.counters.len(), 1);
    assert_eq!(remaining.active_counter.unwrap().id, last.id);
}
