//! Structured event logging shared by every daemon-equivalent component.
//!
//! Mirrors the role of Postfix's `msg_info`/`msg_warn`/`msg_fatal`/`msg_panic`
//! family: a small number of severities, a stable `component[pid]: ` prefix,
//! and typed key/value payloads instead of pre-formatted strings.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;

pub mod value;
pub use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
        })
    }
}

/// Names the originating component, matching the Postfix daemon names this
/// workspace's crates replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Qmgr,
    Anvil,
    Postscreen,
    TrivialRewrite,
    Bounce,
    Haproxy,
    Flush,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::Qmgr => "qmgr",
            Component::Anvil => "anvil",
            Component::Postscreen => "postscreen",
            Component::TrivialRewrite => "trivial-rewrite",
            Component::Bounce => "bounce",
            Component::Haproxy => "haproxy",
            Component::Flush => "flush",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub level: Level,
    pub component: Component,
    pub message: Cow<'static, str>,
    pub kvs: Vec<(&'static str, Value)>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.component, self.level, self.message)?;
        for (k, v) in &self.kvs {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// Receives emitted events. The default collector writes to stderr; tests
/// may install a collector that records events for assertions.
pub trait Collector: Send + Sync {
    fn collect(&self, event: &Event);
}

struct StderrCollector;

impl Collector for StderrCollector {
    fn collect(&self, event: &Event) {
        eprintln!("{event}");
    }
}

static COLLECTOR: OnceLock<RwLock<Box<dyn Collector>>> = OnceLock::new();

fn collector() -> &'static RwLock<Box<dyn Collector>> {
    COLLECTOR.get_or_init(|| RwLock::new(Box::new(StderrCollector)))
}

/// Swap in an application-supplied collector. Used by the `main` crate at
/// startup and by tests that want to capture emitted events.
pub fn set_collector(collector_impl: Box<dyn Collector>) {
    *collector().write() = collector_impl;
}

pub fn emit(event: Event) {
    collector().read().collect(&event);
}

/// Build and emit an [`Event`] in one call. Prefer the `trc::event!` macro at
/// call sites; this is the function it expands to.
pub fn log(level: Level, component: Component, message: impl Into<Cow<'static, str>>) -> Event {
    let event = Event {
        level,
        component,
        message: message.into(),
        kvs: Vec::new(),
    };
    emit(event.clone());
    event
}

/// Emits a structured event with key/value context.
///
/// ```ignore
/// trc::event!(Warn, Qmgr, "queue throttled"; "queue" => name, "window" => 0);
/// ```
#[macro_export]
macro_rules! event {
    ($level:ident, $component:ident, $msg:expr) => {
        $crate::emit($crate::Event {
            level: $crate::Level::$level,
            component: $crate::Component::$component,
            message: ::std::borrow::Cow::from($msg),
            kvs: ::std::vec::Vec::new(),
        })
    };
    ($level:ident, $component:ident, $msg:expr; $($k:expr => $v:expr),+ $(,)?) => {
        $crate::emit($crate::Event {
            level: $crate::Level::$level,
            component: $crate::Component::$component,
            message: ::std::borrow::Cow::from($msg),
            kvs: ::std::vec![$(($k, $crate::Value::from($v))),+],
        })
    };
}

/// An invariant violation that Postfix would treat with `msg_panic`: log at
/// [`Level::Error`] and then abort the process. Reserved for "this cannot
/// happen" conditions (§7 of the spec this workspace implements).
#[macro_export]
macro_rules! panic_event {
    ($component:ident, $msg:expr) => {{
        $crate::event!(Error, $component, $msg);
        panic!("{}", $msg);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingCollector(Arc<Mutex<Vec<Event>>>);

    impl Collector for RecordingCollector {
        fn collect(&self, event: &Event) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn event_macro_carries_kvs() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        set_collector(Box::new(RecordingCollector(sink.clone())));
        event!(Warn, Qmgr, "queue dead"; "queue" => "example.com", "window" => 0i64);
        let recorded = sink.lock();
        let event = recorded.last().expect("event recorded");
        assert_eq!(event.level, Level::Warn);
        assert_eq!(event.message, "queue dead");
        assert_eq!(event.kvs[0].0, "queue");
    }
}
