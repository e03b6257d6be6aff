//! Resolver glue client (§4.12): the synchronous, retry-forever
//! counterpart of `RewriteClient` that other processes (notably the
//! queue manager) use to query the resolver daemon for a recipient's
//! destination.
//!
//! Grounded on `global/resolve_clnt.c`. Same shape as `rewrite_clnt.c`:
//! one persistent connection, an idle timer, and unconditional retry on
//! any I/O error or malformed reply - a resolve failure stalls the
//! caller rather than silently misrouting mail.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

pub struct ResolveClientConfig {
    pub addr: String,
    pub idle_timeout: Duration,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveReply {
    pub transport: String,
    pub nexthop: String,
    pub recipient: String,
}

/// Persistent connection to the resolver daemon. Holds no state about
/// in-flight requests across reconnects, matching `RewriteClient`.
pub struct ResolveClient {
    config: ResolveClientConfig,
    stream: Option<BufReader<TcpStream>>,
}

impl ResolveClient {
    pub fn new(config: ResolveClientConfig) -> Self {
        ResolveClient {
            config,
            stream: None,
        }
    }

    async fn connect(&mut self) -> std::io::Result<()> {
        let stream = TcpStream::connect(&self.config.addr).await?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    /// Resolves `addr`, retrying indefinitely across reconnects on any
    /// I/O error or a reply with an empty transport/recipient - the
    /// daemon never legitimately reports either as empty.
    pub async fn resolve(&mut self, addr: &str) -> ResolveReply {
        loop {
            match self.try_resolve(addr).await {
                Ok(reply) => return reply,
                Err(_) => {
                    self.stream = None;
                    sleep(self.config.retry_backoff).await;
                }
            }
        }
    }

    async fn try_resolve(&mut self, addr: &str) -> std::io::Result<ResolveReply> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        let stream = self.stream.as_mut().expect("just connected");
        let request = proto::attr::encode_text(&[
            ("request", proto::attr::AttrValue::Str("resolve".to_string())),
            ("addr", proto::attr::AttrValue::Str(addr.to_string())),
        ]);
        stream.get_mut().write_all(request.as_bytes()).await?;

        let mut transport = None;
        let mut nexthop = None;
        let mut recipient = None;
        let mut line = String::new();
        loop {
            line.clear();
            let n = stream.read_line(&mut line).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "resolve service closed connection",
                ));
            }
            if line == "@\n" {
                break;
            }
            if let Some(value) = line.strip_prefix("transport=") {
                transport = Some(value.trim_end_matches('\n').to_string());
            } else if let Some(value) = line.strip_prefix("nexthop=") {
                nexthop = Some(value.trim_end_matches('\n').to_string());
            } else if let Some(value) = line.strip_prefix("recipient=") {
                recipient = Some(value.trim_end_matches('\n').to_string());
            }
        }

        let (transport, recipient) = match (transport, recipient) {
            (Some(t), Some(r)) if !t.is_empty() && !r.is_empty() => (t, r),
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "resolve reply missing transport or recipient",
                ))
            }
        };
        Ok(ResolveReply {
            transport,
            nexthop: nexthop.unwrap_or_default(),
            recipient,
        })
    }
}
