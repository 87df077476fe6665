use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dwell_watch::{
    ControlConfig, ControlHandle, ControlServer, VideoSource, WatchConfigFile, WorkerSupervisor,
};

struct Response {
    status_line: String,
    headers: String,
    body: String,
}

fn request(addr: SocketAddr, raw: &str) -> Response {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("timeout");
    stream.write_all(raw.as_bytes()).expect("write request");
    let mut data = Vec::new();
    stream.read_to_end(&mut data).expect("read response");
    let text = String::from_utf8_lossy(&data).to_string();
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text.as_str(), ""));
    let (status_line, headers) = head.split_once("\r\n").unwrap_or((head, ""));
    Response {
        status_line: status_line.to_string(),
        headers: headers.to_string(),
        body: body.to_string(),
    }
}

fn get(addr: SocketAddr, path: &str) -> Response {
    request(
        addr,
        &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
    )
}

fn post_form(addr: SocketAddr, body: &str) -> Response {
    request(
        addr,
        &format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
    )
}

fn start(config_path: &Path) -> (ControlHandle, Arc<Mutex<WorkerSupervisor>>) {
    let supervisor = Arc::new(Mutex::new(WorkerSupervisor::default()));
    let handle = ControlServer::new(
        ControlConfig {
            addr: "127.0.0.1:0".to_string(),
            config_path: config_path.to_path_buf(),
        },
        Arc::clone(&supervisor),
    )
    .spawn()
    .expect("spawn control server");
    (handle, supervisor)
}

/// Keep worker artifacts inside the scratch directory.
fn seed_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.json");
    WatchConfigFile {
        log_path: Some(dir.join("detections.log")),
        snapshot_dir: Some(dir.join("snapshots")),
        ..Default::default()
    }
    .write(&path)
    .expect("seed config");
    path
}

#[test]
fn health_form_and_unknown_paths() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, _supervisor) = start(&seed_config(dir.path()));

    let health = get(handle.addr, "/health");
    assert_eq!(health.status_line, "HTTP/1.1 200 OK");
    assert_eq!(health.body, r#"{"status":"ok"}"#);

    let form = get(handle.addr, "/");
    assert_eq!(form.status_line, "HTTP/1.1 200 OK");
    assert!(form.headers.contains("text/html"));
    assert!(form.body.contains("name=\"forgotten_time\""));

    let missing = get(handle.addr, "/events");
    assert_eq!(missing.status_line, "HTTP/1.1 404 Not Found");

    let wrong_method = request(
        handle.addr,
        "DELETE /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(wrong_method.status_line, "HTTP/1.1 405 Method Not Allowed");

    handle.stop().unwrap();
}

#[test]
fn submission_rewrites_config_and_starts_worker() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = seed_config(dir.path());
    let (handle, supervisor) = start(&config_path);

    let response = post_form(
        handle.addr,
        "min_area=500&forgotten_time=10&video_source=stub%3A%2F%2Fdoor\
         &target_objects=backpack%2C+suitcase&email_notify=&telegram_token=&telegram_chat_id=",
    );
    assert_eq!(response.status_line, "HTTP/1.1 303 See Other");
    assert!(response.headers.contains("Location: /"));

    let written = WatchConfigFile::read(&config_path).unwrap();
    assert_eq!(written.min_area, Some(500));
    assert_eq!(written.forgotten_time, Some(10));
    assert_eq!(written.video_source, Some(VideoSource::Path("stub://door".into())));
    assert_eq!(
        written.target_objects,
        Some(vec!["backpack".to_string(), "suitcase".to_string()])
    );
    assert!(written.email_notify.is_none());
    assert_eq!(written.log_path, Some(dir.path().join("detections.log")));

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut status = get(handle.addr, "/status");
    while !status.body.contains(r#""running":true"#) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
        status = get(handle.addr, "/status");
    }
    assert!(status.body.contains(r#""generation":1"#), "{}", status.body);
    assert!(status.body.contains(r#""running":true"#), "{}", status.body);

    post_form(
        handle.addr,
        "min_area=0&forgotten_time=5&video_source=stub%3A%2F%2Fdoor&target_objects=bag",
    );
    {
        let supervisor = supervisor.lock().unwrap();
        assert_eq!(supervisor.generation(), 2);
        assert!(supervisor.is_running());
    }

    handle.stop().unwrap();
    supervisor.lock().unwrap().stop();
}

#[test]
fn invalid_submission_still_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = seed_config(dir.path());
    let (handle, supervisor) = start(&config_path);

    let response = post_form(handle.addr, "min_area=lots&forgotten_time=10&video_source=0");
    assert_eq!(response.status_line, "HTTP/1.1 303 See Other");
    assert_eq!(WatchConfigFile::read(&config_path).unwrap().min_area, None);
    assert_eq!(supervisor.lock().unwrap().generation(), 0);

    handle.stop().unwrap();
}
