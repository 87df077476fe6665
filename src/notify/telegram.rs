//! Telegram channel: bot API `sendMessage`, then `sendPhoto` when a snapshot
//! exists.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{Alert, DispatchOutcome, NotificationChannel};
use crate::config::TelegramSettings;

const MAX_ERROR_BODY: usize = 200;

pub struct TelegramChannel {
    settings: TelegramSettings,
    agent: ureq::Agent,
}

impl TelegramChannel {
    pub fn new(settings: TelegramSettings, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { settings, agent }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.settings.api_base, self.settings.token, method
        )
    }

    fn send_message(&self, text: &str) -> Result<()> {
        let result = self
            .agent
            .post(&self.endpoint("sendMessage"))
            .send_form(&[("chat_id", self.settings.chat_id.as_str()), ("text", text)]);
        check_response("sendMessage", result)
    }

    fn send_photo(&self, path: &Path) -> Result<()> {
        let photo = std::fs::read(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("snapshot.jpg");
        let boundary = multipart_boundary();
        let body = multipart_body(&boundary, &self.settings.chat_id, file_name, &photo);
        let result = self
            .agent
            .post(&self.endpoint("sendPhoto"))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send_bytes(&body);
        check_response("sendPhoto", result)
    }
}

impl NotificationChannel for TelegramChannel {
    fn send(&self, alert: &Alert) -> DispatchOutcome {
        let message = self.send_message(&alert.message);
        let photo = match &alert.snapshot {
            Some(path) => self.send_photo(path),
            None => Ok(()),
        };
        match (message, photo) {
            (Ok(()), Ok(())) => DispatchOutcome::Sent,
            (Err(err), Ok(())) => DispatchOutcome::Failed(format!("{err:#}")),
            (Ok(()), Err(err)) => {
                DispatchOutcome::Failed(format!("message sent, photo failed: {err:#}"))
            }
            (Err(msg_err), Err(photo_err)) => DispatchOutcome::Failed(format!(
                "message failed: {msg_err:#}; photo failed: {photo_err:#}"
            )),
        }
    }
}

fn check_response(method: &str, result: Result<ureq::Response, ureq::Error>) -> Result<()> {
    match result {
        Ok(response) if (200..300).contains(&response.status()) => Ok(()),
        Ok(response) => Err(anyhow!("{} returned HTTP {}", method, response.status())),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            Err(anyhow!("{} returned HTTP {}: {}", method, code, body))
        }
        Err(err) => Err(anyhow!("{} transport error: {}", method, err)),
    }
}

fn multipart_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("dwellwatch-{nanos:x}")
}

fn multipart_body(boundary: &str, chat_id: &str, file_name: &str, photo: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(photo.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"chat_id\"\r\n\r\n\
             {chat_id}\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\n\
             Content-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(photo);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
