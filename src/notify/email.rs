//! Email channel: plain-text alert through a local SMTP relay.
//!
//! The relay is trusted and local, so the session is a bare RFC 5321
//! exchange: no TLS, no AUTH. Sender and recipient are the same configured
//! address.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Alert, DispatchOutcome, NotificationChannel};
use crate::config::EmailSettings;

const CLIENT_NAME: &str = "dwell-watch.localhost";

pub struct EmailChannel {
    settings: EmailSettings,
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(settings: EmailSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        let addr = self
            .settings
            .relay
            .to_socket_addrs()
            .with_context(|| format!("resolve smtp relay {}", self.settings.relay))?
            .next()
            .ok_or_else(|| anyhow!("smtp relay {} has no address", self.settings.relay))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)
            .with_context(|| format!("connect to smtp relay {}", addr))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut session = SmtpSession::new(stream)?;
        session.expect(&[220])?;
        session.command(&format!("EHLO {CLIENT_NAME}"), &[250])?;
        session.command(&format!("MAIL FROM:<{}>", self.settings.address), &[250])?;
        session.command(&format!("RCPT TO:<{}>", self.settings.address), &[250, 251])?;
        session.command("DATA", &[354])?;
        session.send_data(&self.render_message(alert))?;
        session.expect(&[250])?;
        // The message is accepted at this point; a failed QUIT changes nothing.
        let _ = session.command("QUIT", &[221]);
        Ok(())
    }

    fn render_message(&self, alert: &Alert) -> String {
        let address = &self.settings.address;
        format!(
            "From: <{address}>\r\n\
             To: <{address}>\r\n\
             Subject: {subject}\r\n\
             Date: {date}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             {body}\r\n",
            subject = header_safe(&alert.subject),
            date = Local::now().to_rfc2822(),
            body = alert.message.replace('\n', "\r\n"),
        )
    }
}

impl NotificationChannel for EmailChannel {
    fn send(&self, alert: &Alert) -> DispatchOutcome {
        match self.deliver(alert) {
            Ok(()) => DispatchOutcome::Sent,
            Err(err) => DispatchOutcome::Failed(format!("{err:#}")),
        }
    }
}

struct SmtpSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl SmtpSession {
    fn new(stream: TcpStream) -> Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn command(&mut self, line: &str, accept: &[u16]) -> Result<u16> {
        self.writer.write_all(format!("{line}\r\n").as_bytes())?;
        self.expect(accept)
    }

    /// Read one (possibly multi-line) reply and check its code.
    fn expect(&mut self, accept: &[u16]) -> Result<u16> {
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Err(anyhow!("smtp relay closed the connection"));
            }
            let code: u16 = line
                .get(..3)
                .and_then(|c| c.parse().ok())
                .ok_or_else(|| anyhow!("malformed smtp reply: {}", line.trim_end()))?;
            if line.as_bytes().get(3) == Some(&b'-') {
                continue;
            }
            if accept.contains(&code) {
                return Ok(code);
            }
            return Err(anyhow!("smtp relay replied {}", line.trim_end()));
        }
    }

    /// Send the message body with dot-stuffing and the terminating dot line.
    fn send_data(&mut self, message: &str) -> Result<()> {
        let mut data = String::with_capacity(message.len() + 8);
        for line in message.split("\r\n") {
            if line.starts_with('.') {
                data.push('.');
            }
            data.push_str(line);
            data.push_str("\r\n");
        }
        data.push_str(".\r\n");
        self.writer.write_all(data.as_bytes())?;
        Ok(())
    }
}

/// Headers stay 7-bit: non-ASCII and control characters become '?'.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::resolve::IdentityKey;
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Minimal relay: accepts one session and returns the DATA payload.
    fn fake_relay(reject_rcpt: bool) -> Result<(String, JoinHandle<Vec<String>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?.to_string();
        let join = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut writer = stream.try_clone().expect("clone");
            let mut reader = BufReader::new(stream);
            let mut transcript = Vec::new();
            writer.write_all(b"220 fake relay\r\n").unwrap();
            let mut in_data = false;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end_matches("\r\n").to_string();
                if in_data {
                    if line == "." {
                        in_data = false;
                        writer.write_all(b"250 queued\r\n").unwrap();
                    } else {
                        transcript.push(line);
                    }
                    continue;
                }
                let reply: &[u8] = if line.starts_with("EHLO") {
                    b"250-fake relay\r\n250 8BITMIME\r\n"
                } else if line.starts_with("RCPT") && reject_rcpt {
                    b"550 no such user\r\n"
                } else if line == "DATA" {
                    in_data = true;
                    b"354 go ahead\r\n"
                } else if line == "QUIT" {
                    writer.write_all(b"221 bye\r\n").unwrap();
                    break;
                } else {
                    b"250 ok\r\n"
                };
                writer.write_all(reply).unwrap();
            }
            transcript
        });
        Ok((addr, join))
    }

    fn alert() -> Alert {
        Alert::compose(
            IdentityKey::new(125, 125, "backpack"),
            BoundingBox::new(100, 100, 50, 50),
            Duration::from_secs(11),
        )
    }

    fn channel(relay: String) -> EmailChannel {
        EmailChannel::new(
            EmailSettings {
                address: "guard@example.org".into(),
                relay,
            },
            Duration::from_secs(2),
        )
    }

    #[test]
    fn delivers_subject_and_body_through_relay() -> Result<()> {
        let (addr, join) = fake_relay(false)?;
        assert_eq!(channel(addr).send(&alert()), DispatchOutcome::Sent);

        let transcript = join.join().expect("relay thread");
        assert!(transcript.iter().any(|l| l == "Subject: Forgotten object"));
        assert!(transcript.iter().any(|l| l == "To: <guard@example.org>"));
        assert!(transcript
            .iter()
            .any(|l| l == "Forgotten object: backpack (100, 100)"));
        Ok(())
    }

    #[test]
    fn rejected_recipient_is_a_failed_outcome() -> Result<()> {
        let (addr, join) = fake_relay(true)?;
        let outcome = channel(addr).send(&alert());
        assert!(matches!(outcome, DispatchOutcome::Failed(ref r) if r.contains("550")));
        drop(join);
        Ok(())
    }

    #[test]
    fn unreachable_relay_is_a_failed_outcome() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?.to_string();
        drop(listener);
        assert!(matches!(
            channel(addr).send(&alert()),
            DispatchOutcome::Failed(_)
        ));
        Ok(())
    }

    #[test]
    fn header_values_are_seven_bit() {
        assert_eq!(header_safe("Forgotten\r\nobject é"), "Forgotten??object ?");
    }
}
