//! Loopback control surface: a configuration form that rewrites the config
//! file and restarts the worker, plus status and health endpoints.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{split_csv, VideoSource, WatchConfigFile, DEFAULT_CONFIG_PATH};
use crate::worker::WorkerSupervisor;

const MAX_REQUEST_BYTES: usize = 16 * 1024;

const FORM_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>dwell-watch</title></head>
<body>
<h1>Forgotten object detection</h1>
<form method="post" action="/">
  <label>Minimum area (px&sup2;) <input name="min_area" type="number" min="0" value="{min_area}" required></label><br>
  <label>Forgotten after (s) <input name="forgotten_time" type="number" min="0" value="{forgotten_time}" required></label><br>
  <label>Video source <input name="video_source" value="{video_source}" required></label><br>
  <label>Target objects <input name="target_objects" value="{target_objects}"></label><br>
  <label>Email <input name="email_notify" type="email" value="{email_notify}"></label><br>
  <label>Telegram token <input name="telegram_token" value="{telegram_token}"></label><br>
  <label>Telegram chat id <input name="telegram_chat_id" value="{telegram_chat_id}"></label><br>
  <button type="submit">Save and start</button>
</form>
</body>
</html>
"#;

#[derive(Clone, Debug)]
pub struct ControlConfig {
    pub addr: String,
    pub config_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8780".to_string(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

#[derive(Debug)]
pub struct ControlHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ControlHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("control server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ControlServer {
    cfg: ControlConfig,
    supervisor: Arc<Mutex<WorkerSupervisor>>,
}

impl ControlServer {
    pub fn new(cfg: ControlConfig, supervisor: Arc<Mutex<WorkerSupervisor>>) -> Self {
        Self { cfg, supervisor }
    }

    pub fn spawn(self) -> Result<ControlHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "control configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("dwell-control".to_string())
            .spawn(move || {
                if let Err(err) = run_control(listener, &self, shutdown_thread) {
                    log::error!("control server stopped: {}", err);
                }
            })
            .context("spawn control server thread")?;

        Ok(ControlHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_control(
    listener: TcpListener,
    server: &ControlServer,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, server) {
                    log::warn!("control request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, server: &ControlServer) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_response(&mut stream, 403, "application/json", br#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => {
            let page = render_form(&server.cfg.config_path);
            write_response(&mut stream, 200, "text/html; charset=utf-8", page.as_bytes())
        }
        ("POST", "/") => {
            apply_submission(server, &request.body);
            write_redirect(&mut stream, "/")
        }
        ("GET", "/status") => {
            let status = server
                .supervisor
                .lock()
                .map_err(|_| anyhow!("supervisor lock poisoned"))?
                .status();
            let payload = serde_json::to_vec(&status)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        ("GET", "/health") => {
            write_response(&mut stream, 200, "application/json", br#"{"status":"ok"}"#)
        }
        (_, "/" | "/status" | "/health") => write_response(
            &mut stream,
            405,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        ),
        _ => write_response(
            &mut stream,
            404,
            "application/json",
            br#"{"error":"not_found"}"#,
        ),
    }
}

/// Write the submitted configuration and restart the worker. Failures are
/// logged; the client is redirected either way.
fn apply_submission(server: &ControlServer, body: &[u8]) {
    let path = &server.cfg.config_path;
    let file = match config_from_form(path, body) {
        Ok(file) => file,
        Err(err) => {
            log::warn!("configuration form rejected: {:#}", err);
            return;
        }
    };
    if let Err(err) = file.write(path) {
        log::error!("{:#}", err);
        return;
    }
    log::info!("configuration written to {}", path.display());

    match server.supervisor.lock() {
        Ok(mut supervisor) => {
            if let Err(err) = supervisor.restart_from(path) {
                log::error!("worker restart failed: {:#}", err);
            }
        }
        Err(_) => log::error!("supervisor lock poisoned; worker not restarted"),
    }
}

/// Merge form fields onto the existing file so settings the form does not
/// show survive a submission.
pub fn config_from_form(path: &Path, body: &[u8]) -> Result<WatchConfigFile> {
    let fields: HashMap<String, String> = url::form_urlencoded::parse(body)
        .into_owned()
        .collect();
    let mut file = WatchConfigFile::read(path).unwrap_or_default();
    file.min_area = Some(
        form_field(&fields, "min_area")?
            .parse()
            .map_err(|_| anyhow!("min_area must be an integer"))?,
    );
    file.forgotten_time = Some(
        form_field(&fields, "forgotten_time")?
            .parse()
            .map_err(|_| anyhow!("forgotten_time must be a non-negative integer"))?,
    );
    file.video_source = Some(VideoSource::parse(form_field(&fields, "video_source")?)?);
    file.target_objects = Some(split_csv(
        form_field(&fields, "target_objects").unwrap_or_default(),
    ));
    file.email_notify = optional_field(&fields, "email_notify");
    file.telegram_token = optional_field(&fields, "telegram_token");
    file.telegram_chat_id = optional_field(&fields, "telegram_chat_id");
    Ok(file)
}

fn form_field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(|v| v.trim())
        .ok_or_else(|| anyhow!("form field {} is missing", name))
}

fn optional_field(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    fields
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn render_form(config_path: &Path) -> String {
    let file = WatchConfigFile::read(config_path).unwrap_or_default();
    let text = |value: Option<String>| html_escape(&value.unwrap_or_default());
    FORM_HTML
        .replace("{min_area}", &text(file.min_area.map(|v| v.to_string())))
        .replace(
            "{forgotten_time}",
            &text(file.forgotten_time.map(|v| v.to_string())),
        )
        .replace(
            "{video_source}",
            &text(file.video_source.map(|source| match source {
                VideoSource::Device(index) => index.to_string(),
                VideoSource::Path(path) => path,
            })),
        )
        .replace(
            "{target_objects}",
            &text(file.target_objects.map(|labels| labels.join(", "))),
        )
        .replace("{email_notify}", &text(file.email_notify))
        .replace("{telegram_token}", &text(file.telegram_token))
        .replace("{telegram_chat_id}", &text(file.telegram_chat_id))
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data.len();
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut content_length = 0usize;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            if k.trim().eq_ignore_ascii_case("content-length") {
                content_length = v
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("invalid content-length"))?;
            }
        }
    }
    if header_end + content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }

    let mut body = data.split_off(header_end);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("request body truncated"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_redirect(stream: &mut TcpStream, location: &str) -> Result<()> {
    let header = format!(
        "HTTP/1.1 303 See Other\r\nLocation: {location}\r\nContent-Length: 0\r\nCache-Control: no-store\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;
    Ok(())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_fields_become_config_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let body = b"min_area=500&forgotten_time=10&video_source=0\
                     &target_objects=backpack%2C+suitcase+%2C&email_notify=&telegram_token=t&telegram_chat_id=42";
        let file = config_from_form(&path, body)?;
        assert_eq!(file.min_area, Some(500));
        assert_eq!(file.forgotten_time, Some(10));
        assert_eq!(file.video_source, Some(VideoSource::Device(0)));
        assert_eq!(
            file.target_objects,
            Some(vec!["backpack".to_string(), "suitcase".to_string()])
        );
        assert_eq!(file.email_notify, None);
        assert_eq!(file.telegram_chat_id.as_deref(), Some("42"));
        Ok(())
    }

    #[test]
    fn submission_keeps_fields_the_form_does_not_show() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        WatchConfigFile {
            snapshot_dir: Some(PathBuf::from("/var/lib/dwell/snapshots")),
            min_area: Some(1),
            ..Default::default()
        }
        .write(&path)?;
        let file = config_from_form(
            &path,
            b"min_area=7&forgotten_time=3&video_source=clip.mp4&target_objects=bag",
        )?;
        assert_eq!(file.min_area, Some(7));
        assert_eq!(file.video_source, Some(VideoSource::Path("clip.mp4".into())));
        assert_eq!(
            file.snapshot_dir,
            Some(PathBuf::from("/var/lib/dwell/snapshots"))
        );
        Ok(())
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        let path = Path::new("/nonexistent/config.json");
        assert!(config_from_form(path, b"min_area=big&forgotten_time=1&video_source=0").is_err());
        assert!(config_from_form(path, b"min_area=1&video_source=0").is_err());
    }

    #[test]
    fn form_values_are_escaped() {
        assert_eq!(html_escape(r#"a"<b>&'"#), "a&quot;&lt;b&gt;&amp;&#39;");
    }
}
