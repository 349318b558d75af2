use finances::render::FieldEntry;
use finances::snapshot::Section;
use finances::{DateController, HttpServer, Ledger};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

struct TestServer {
    base_url: String,
    data_dir: PathBuf,
    month: String,
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
    use std::sync::Once;
    use std::sync::atomic::{AtomicI32, Ordering};

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

fn unique_data_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("finances_http_{}_{}", std::process::id(), nanos));
    path
}

fn write_json(dir: &Path, relative: &str, value: Value) {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
}

fn read_json(dir: &Path, relative: &str) -> Value {
    serde_json::from_slice(&std::fs::read(dir.join(relative)).unwrap()).unwrap()
}

fn seed(dir: &Path, month: &str) {
    write_json(
        dir,
        &format!("{month}.json"),
        json!({
            "income": {"paycheck": 2500},
            "debt": {
                "credit_cards": {"visa": {"bofa_cash": 150}},
                "due_dates": {"remote": true, "file": format!("due_dates/{month}.json")}
            },
            "to_pay": {"bills": {"rent": {"value": 1200, "paid": true}, "power": 80}},
            "notes": {"remote": true, "file": format!("notes/{month}.json")}
        }),
    );
    write_json(
        dir,
        &format!("due_dates/{month}.json"),
        json!({"due_dates": {"visa": {"bofa_cash": {"date": 12, "paid": true}}}}),
    );
    write_json(dir, &format!("notes/{month}.json"), json!({"notes": {"todo": ["call bank"]}}));
    write_json(dir, "analysis/stats.json", json!({"months": 1}));
}

async fn wait_until_ready(base_url: &str, month: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/months/{month}")).send().await {
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
    let data_dir = unique_data_dir();
    let month = DateController::new().current().to_string();
    seed(&data_dir, &month);

    let child = Command::new(env!("CARGO_BIN_EXE_finances"))
        .env("PORT", port.to_string())
        .env("FINANCES_DATA_DIR", &data_dir)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url, &month).await;

    TestServer {
        base_url,
        data_dir,
        month,
        child,
    }
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

async fn loaded_ledger(server: &TestServer) -> Ledger {
    let mut ledger = Ledger::new(
        Arc::new(HttpServer::new(server.base_url.clone())),
        DateController::new(),
        "$",
    );
    ledger.load().await;
    ledger
}

fn find_entry(ledger: &Ledger, section: Section, key: &str) -> (usize, FieldEntry) {
    ledger
        .state()
        .tree
        .fields_in(section)
        .into_iter()
        .find(|(_, entry)| entry.key_name == key)
        .map(|(id, entry)| (id, entry.clone()))
        .expect("entry rendered")
}

#[tokio::test]
async fn http_load_settles_with_remote_sections() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let ledger = loaded_ledger(&server).await;

    let state = ledger.state();
    assert!(state.settled);
    assert_eq!(state.overview.debt_total, "Total: $150.00");
    assert_eq!(state.totals.income, 2500.0);
    assert!(state.trend.is_some());

    let (_, cash) = find_entry(&ledger, Section::Debt, "bofa_cash");
    assert_eq!(cash.due.as_ref().map(|due| due.day), Some(12));
    assert!(!state.tree.fields_in(Section::Notes).is_empty());
}

#[tokio::test]
async fn http_edit_is_written_to_disk() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let mut ledger = loaded_ledger(&server).await;

    let (id, _) = find_entry(&ledger, Section::ToPay, "power");
    ledger.open_input(id).unwrap();
    ledger.submit_edit(id, "$95.25").await.unwrap();

    let document = read_json(&server.data_dir, &format!("{}.json", server.month));
    assert_eq!(document["to_pay"]["bills"]["power"], json!(95.25));
    assert_eq!(document["to_pay"]["bills"]["rent"]["value"], json!(1200));
    assert_eq!(ledger.state().overview.to_pay_total, "Total: $1295.25");
}

#[tokio::test]
async fn http_note_add_reloads_the_month() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let mut ledger = loaded_ledger(&server).await;
    let before = ledger.state().tree.fields_in(Section::Notes).len();

    assert!(ledger.add_note("todo", "renew card").await.unwrap());

    assert_eq!(ledger.state().tree.fields_in(Section::Notes).len(), before + 1);
    let notes = read_json(&server.data_dir, &format!("notes/{}.json", server.month));
    let todo = notes["notes"]["todo"].as_array().unwrap();
    assert_eq!(todo.last(), Some(&json!("renew card")));
}

#[tokio::test]
async fn http_navigate_forward_creates_next_month() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let mut ledger = loaded_ledger(&server).await;
    let next = ledger.state().date.next_key();

    ledger.navigate(1).await.unwrap();
    assert_eq!(ledger.state().date.current(), next);
    assert!(ledger.state().settled);

    let created = read_json(&server.data_dir, &format!("{next}.json"));
    assert_eq!(created["to_pay"]["bills"]["rent"]["paid"], json!(false));
    assert_eq!(
        created["debt"]["due_dates"]["file"],
        json!(format!("due_dates/{next}.json"))
    );
    let due_dates = read_json(&server.data_dir, &format!("due_dates/{next}.json"));
    assert_eq!(due_dates["due_dates"]["visa"]["bofa_cash"]["paid"], json!(false));
}

#[tokio::test]
async fn http_data_paths_are_confined() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let escaped = client
        .get(format!("{}/data/..%2Fsecret.json", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(escaped.status(), reqwest::StatusCode::BAD_REQUEST);

    let missing = client
        .get(format!("{}/data/1999_01.json", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let far = client
        .get(format!("{}/?offset=2147483647", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(far.status(), reqwest::StatusCode::BAD_REQUEST);

    let page = client.get(format!("{}/", server.base_url)).send().await.unwrap();
    assert!(page.status().is_success());
    assert!(page.text().await.unwrap().contains("Total: $"));
}
