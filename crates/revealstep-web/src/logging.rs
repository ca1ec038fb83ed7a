#![forbid(unsafe_code)]

//! Tracing layer that writes engine events to a console sink.
//!
//! In the browser the sink is the devtools console (see
//! `initLogging` in the wasm module); tests use a capture sink.
//!
//! ```ignore
//! use revealstep_web::logging::ConsoleLayer;
//! use tracing_subscriber::prelude::*;
//!
//! tracing_subscriber::registry().with(ConsoleLayer::new(sink)).init();
//! ```

use std::fmt::{self, Write as FmtWrite};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Receives one formatted line per event.
pub trait ConsoleSink: Send + Sync + 'static {
    fn write_line(&self, level: Level, line: &str);
}

/// A `tracing_subscriber::Layer` that formats events as single lines.
#[derive(Debug)]
pub struct ConsoleLayer<K> {
    sink: K,
    show_target: bool,
}

impl<K: ConsoleSink> ConsoleLayer<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            show_target: true,
        }
    }

    #[must_use]
    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    fn format(&self, event: &Event<'_>) -> String {
        let metadata = event.metadata();
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut line = String::new();
        let _ = write!(line, "{} ", level_str(*metadata.level()));
        if self.show_target {
            let _ = write!(line, "{}: ", metadata.target());
        }
        line.push_str(visitor.message.as_deref().unwrap_or_default());
        for (key, value) in &visitor.fields {
            let _ = write!(line, " {key}={value}");
        }
        line
    }
}

impl<S, K> Layer<S> for ConsoleLayer<K>
where
    S: Subscriber,
    K: ConsoleSink,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let line = self.format(event);
        self.sink.write_line(*event.metadata().level(), &line);
    }
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN ",
        Level::INFO => "INFO ",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl EventVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_owned());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }
}
