//! Address rewriter client (§4.3): quotes/unquotes the local part around
//! a persistent connection to the rewrite service, reconnecting and
//! retrying indefinitely on any I/O error - losing mail is not an
//! acceptable failure mode, so the client never gives up.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Quotes an RFC-822 local part: any of `()<>@,;:\"[]` or a space gets
/// backslash-escaped and the whole local part wrapped in double quotes
/// when at least one such character is present.
pub fn quote_822_local(local_part: &str) -> String {
    const SPECIAL: &[u8] = b"()<>@,;:\\\".[] ";
    let needs_quoting = local_part.bytes().any(|b| SPECIAL.contains(&b));
    if !needs_quoting {
        return local_part.to_string();
    }
    let mut out = String::with_capacity(local_part.len() + 2);
    out.push('"');
    for ch in local_part.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

pub fn unquote_822_local(local_part: &str) -> String {
    let Some(inner) = local_part.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return local_part.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(ch);
    }
    out
}

pub struct RewriteClientConfig {
    pub addr: String,
    pub idle_timeout: Duration,
    pub retry_backoff: Duration,
}

/// Persistent connection to the rewrite service. Holds no state about
/// in-flight requests across reconnects - a reconnect simply means the
/// next call pays the cost of a fresh TCP handshake.
pub struct RewriteClient {
    config: RewriteClientConfig,
    stream: Option<BufReader<TcpStream>>,
}

impl RewriteClient {
    pub fn new(config: RewriteClientConfig) -> Self {
        RewriteClient {
            config,
            stream: None,
        }
    }

    async fn connect(&mut self) -> std::io::Result<()> {
        let stream = TcpStream::connect(&self.config.addr).await?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    /// Rewrites `addr` under `ruleset`, retrying indefinitely across
    /// reconnects on any I/O error.
    pub async fn rewrite(&mut self, ruleset: &str, addr: &str) -> String {
        loop {
            match self.try_rewrite(ruleset, addr).await {
                Ok(result) => return result,
                Err(_) => {
                    self.stream = None;
                    sleep(self.config.retry_backoff).await;
                }
            }
        }
    }

    async fn try_rewrite(&mut self, ruleset: &str, addr: &str) -> std::io::Result<String> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        let stream = self.stream.as_mut().expect("just connected");
        let request = proto::attr::encode_text(&[
            ("request", proto::attr::AttrValue::Str("rewrite".to_string())),
            ("rule", proto::attr::AttrValue::Str(ruleset.to_string())),
            ("addr", proto::attr::AttrValue::Str(addr.to_string())),
        ]);
        stream.get_mut().write_all(request.as_bytes()).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let n = stream.read_line(&mut line).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "rewrite service closed connection",
                ));
            }
            if line == "@\n" {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "rewrite reply missing addr attribute",
                ));
            }
            if let Some(value) = line.strip_prefix("addr=") {
                return Ok(value.trim_end_matches('\n').to_string());
            }
        }
    }
}
