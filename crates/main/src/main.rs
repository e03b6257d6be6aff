use std::collections::HashMap;
use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

use anvil::AnvilTable;
use postscreen::dnsbl::{DnsblAggregator, DnsblConfig};
use proto::attr::{self, AttrValue};
use qmgr::flush::FlushService;

const LINE_LENGTH_LIMIT: usize = 4096;

/// Owns every table that would otherwise be `static` file-scope state
/// in the C daemons (§9, "Global mutable state"). Each handler gets a
/// clone of the `Arc` rather than reaching for a global. The transport
/// scheduler and per-destination queues (`qmgr::scheduler`,
/// `qmgr::queue`) live inside the queue manager's own event loop rather
/// than behind a socket, so they have no table here (§5, §6).
struct Service {
    anvil: Mutex<AnvilTable>,
    dnsbl: Mutex<DnsblAggregator>,
    flush: Mutex<FlushService>,
}

impl Service {
    fn new(dnsbl_config: DnsblConfig, flush_sites: Vec<String>) -> Self {
        Service {
            anvil: Mutex::new(AnvilTable::new(60)),
            dnsbl: Mutex::new(DnsblAggregator::new(dnsbl_config)),
            flush: Mutex::new(FlushService::new(flush_sites, 1000)),
        }
    }
}

fn lookup<'a>(attrs: &'a [(String, AttrValue)], name: &str) -> Option<&'a AttrValue> {
    attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

/// Reads one text-form attribute list up to and including its `@\n`
/// terminator. Returns `None` on a clean EOF between requests.
async fn read_request(stream: &mut BufReader<&mut UnixStream>) -> io::Result<Option<Vec<(String, AttrValue)>>> {
    let mut raw = String::new();
    loop {
        let mut line = String::new();
        let read = tokio::io::AsyncBufReadExt::read_line(stream, &mut line).await?;
        if read == 0 {
            return if raw.is_empty() { Ok(None) } else { Err(io::ErrorKind::UnexpectedEof.into()) };
        }
        let terminator = line == "@\n";
        raw.push_str(&line);
        if terminator {
            break;
        }
    }
    attr::decode_text(&raw, LINE_LENGTH_LIMIT)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

async fn write_reply(stream: &mut UnixStream, attrs: &[(&str, AttrValue)]) -> io::Result<()> {
    stream.write_all(attr::encode_text(attrs).as_bytes()).await
}

fn unix_time_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `request={connect|disconnect|lookup} ident=<s>` (§6).
async fn handle_anvil_connection(service: Arc<Service>, mut stream: UnixStream) -> io::Result<()> {
    let local_id = stream.as_raw_fd() as u64;
    loop {
        let (reader, _) = stream.split();
        let mut reader = BufReader::new(reader);
        let Some(request) = read_request(&mut reader).await? else {
            return Ok(());
        };
        drop(reader);

        let request_kind = lookup(&request, "request").and_then(AttrValue::as_str);
        let ident = lookup(&request, "ident").and_then(AttrValue::as_str);
        let (Some(request_kind), Some(ident)) = (request_kind, ident) else {
            write_reply(&mut stream, &[("status", AttrValue::Int(-1))]).await?;
            continue;
        };

        let now = unix_time_secs();
        let mut anvil = service.anvil.lock().await;
        let reply = match request_kind {
            "connect" => {
                let status = anvil.connect(local_id, ident, now);
                vec![
                    ("status", AttrValue::Int(0)),
                    ("count", AttrValue::Int(status.count)),
                    ("rate", AttrValue::Int(status.rate)),
                ]
            }
            "disconnect" => {
                anvil.disconnect(local_id, ident, now);
                vec![("status", AttrValue::Int(0))]
            }
            "lookup" => {
                let status = anvil.lookup(ident).unwrap_or(anvil::RemoteStatus { count: 0, rate: 0 });
                vec![
                    ("status", AttrValue::Int(0)),
                    ("count", AttrValue::Int(status.count)),
                    ("rate", AttrValue::Int(status.rate)),
                ]
            }
            _ => vec![("status", AttrValue::Int(-1))],
        };
        drop(anvil);
        write_reply(&mut stream, &reply).await?;
    }
}

/// `request={add|send} site=<s> [queue_id=<s>]` (§6).
async fn handle_flush_connection(service: Arc<Service>, mut stream: UnixStream) -> io::Result<()> {
    struct NoopTouch;
    impl qmgr::flush::QueueTouch for NoopTouch {
        fn touch(&mut self, _queue_id: &str) {}
        fn request_rescan(&mut self) {}
    }

    loop {
        let (reader, _) = stream.split();
        let mut reader = BufReader::new(reader);
        let Some(request) = read_request(&mut reader).await? else {
            return Ok(());
        };
        drop(reader);

        let request_kind = lookup(&request, "request").and_then(AttrValue::as_str);
        let site = lookup(&request, "site").and_then(AttrValue::as_str);
        let (Some(request_kind), Some(site)) = (request_kind, site) else {
            write_reply(&mut stream, &[("status", AttrValue::Int(1))]).await?;
            continue;
        };

        let mut flush = service.flush.lock().await;
        let status: i64 = match request_kind {
            "add" => {
                let queue_id = lookup(&request, "queue_id").and_then(AttrValue::as_str).unwrap_or("");
                match flush.add(site, queue_id).0 {
                    qmgr::flush::AddOutcome::Ok => 0,
                    qmgr::flush::AddOutcome::UnknownSite => 2,
                }
            }
            "send" => match flush.send(site, &mut NoopTouch) {
                qmgr::flush::SendOutcome::Ok => 0,
                qmgr::flush::SendOutcome::UnknownSite => 2,
            },
            _ => 1,
        };
        drop(flush);
        write_reply(&mut stream, &[("status", AttrValue::Int(status))]).await?;
    }
}

async fn serve<F, Fut>(
    socket_path: &str,
    component: trc::Component,
    service: Arc<Service>,
    handler: F,
) -> io::Result<()>
where
    F: Fn(Arc<Service>, UnixStream) -> Fut + Copy + Send + 'static,
    Fut: std::future::Future<Output = io::Result<()>> + Send + 'static,
{
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    trc::emit(trc::Event {
        level: trc::Level::Info,
        component,
        message: "listening".into(),
        kvs: vec![("path", trc::Value::from(socket_path.to_string()))],
    });
    loop {
        let (stream, _addr) = listener.accept().await?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(error) = handler(service, stream).await {
                trc::emit(trc::Event {
                    level: trc::Level::Warn,
                    component,
                    message: "connection handler failed".into(),
                    kvs: vec![("reason", trc::Value::from(error.to_string()))],
                });
            }
        });
    }
}

#[tokio::main]
async fn main() {
    let dnsbl_config = DnsblConfig::from_specs(&["zen.spamhaus.org"], &HashMap::new())
        .expect("built-in DNSBL site list must parse");
    let service = Arc::new(Service::new(dnsbl_config, vec!["mail.example.com".to_string()]));

    let anvil_task = tokio::spawn(serve(
        "/var/spool/postfix/private/anvil",
        trc::Component::Anvil,
        service.clone(),
        handle_anvil_connection,
    ));
    let flush_task = tokio::spawn(serve(
        "/var/spool/postfix/private/flush",
        trc::Component::Flush,
        service.clone(),
        handle_flush_connection,
    ));

    let _ = tokio::try_join!(anvil_task, flush_task);
}
