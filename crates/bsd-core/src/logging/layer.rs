//! `JsonlLayer`: one JSON record per tracing event.
//!
//! Each event becomes one [`LogEvent`] line. Correlation fields given on
//! the event win over those of enclosing spans.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::{Level, LogEvent};

/// Correlation fields carried by spans and events.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    host_id: Option<String>,
    stage: Option<String>,
    dif: Option<u64>,
}

impl SpanContext {
    /// Fill unset fields from an outer context.
    fn inherit(&mut self, outer: &SpanContext) {
        self.run_id = self.run_id.take().or_else(|| outer.run_id.clone());
        self.host_id = self.host_id.take().or_else(|| outer.host_id.clone());
        self.stage = self.stage.take().or_else(|| outer.stage.clone());
        self.dif = self.dif.or(outer.dif);
    }
}

/// Sorts recorded fields into correlation ids, the message and the rest.
#[derive(Default)]
struct FieldCollector {
    context: SpanContext,
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, name: &str, value: Value) {
        match (name, value) {
            ("message", Value::String(s)) => self.message = Some(s),
            ("run_id", Value::String(s)) => self.context.run_id = Some(s),
            ("host_id", Value::String(s)) => self.context.host_id = Some(s),
            ("stage", Value::String(s)) => self.context.stage = Some(s),
            ("dif", Value::Number(n)) if n.is_u64() => self.context.dif = n.as_u64(),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field.name(), Value::from(format!("{value:?}")));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // Non-finite floats have no JSON form.
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.put(field.name(), Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field.name(), Value::Bool(value));
    }
}

/// JSONL tracing layer that outputs to stderr.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    /// Create a new JSONL layer writing to stderr.
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Create a new JSONL layer with a custom writer.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(collector.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        // Event fields win; spans fill the gaps, innermost first.
        let mut context = collector.context;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    context.inherit(span_ctx);
                }
            }
        }

        let record = LogEvent {
            ts: Utc::now(),
            level: Level::from(*event.metadata().level()),
            event: event.metadata().target().to_string(),
            run_id: context.run_id,
            dif: context.dif,
            host_id: context.host_id,
            stage: context.stage,
            message: collector.message,
            fields: collector.fields,
        };
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", record.to_jsonl());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<serde_json::Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.lock().unwrap();
        String::from_utf8_lossy(&output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_jsonl_layer_output() {
        let lines = capture(|| {
            tracing::info!(target: "test.event", message = "test message");
        });

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[0]["event"], "test.event");
        assert_eq!(lines[0]["message"], "test message");
    }

    #[test]
    fn test_correlation_fields_promoted() {
        let lines = capture(|| {
            tracing::info!(
                target: "stream.progress",
                run_id = "run-abc",
                host_id = "host-1",
                stage = "stream",
                dif = 3u32,
                processed = 1000u64,
                message = "progress"
            );
        });

        let line = &lines[0];
        assert_eq!(line["run_id"], "run-abc");
        assert_eq!(line["host_id"], "host-1");
        assert_eq!(line["stage"], "stream");
        assert_eq!(line["dif"], 3);
        assert_eq!(line["fields"]["processed"], 1000);
        assert!(line["fields"].get("run_id").is_none());
    }

    #[test]
    fn test_span_context_inherited() {
        let lines = capture(|| {
            let span = tracing::info_span!("run", run_id = "run-span", dif = 5u32);
            let _guard = span.enter();
            tracing::warn!(target: "spill.rejected", stage = "classify", reason = "low_intensity");
        });

        let line = &lines[0];
        assert_eq!(line["level"], "warn");
        assert_eq!(line["run_id"], "run-span");
        assert_eq!(line["dif"], 5);
        assert_eq!(line["stage"], "classify");
        assert_eq!(line["fields"]["reason"], "low_intensity");
    }

    #[test]
    fn test_event_fields_override_span() {
        let lines = capture(|| {
            let span = tracing::info_span!("run", stage = "init");
            let _guard = span.enter();
            tracing::info!(target: "topology.resolved", stage = "topology");
        });

        assert_eq!(lines[0]["stage"], "topology");
    }

    #[test]
    fn test_lines_are_log_events() {
        let lines = capture(|| {
            tracing::debug!(target: "bsd_tree::reader", rows = 3u64, "read batch");
        });

        let record: LogEvent = serde_json::from_value(lines[0].clone()).unwrap();
        assert_eq!(record.level, Level::Debug);
        assert_eq!(record.event, "bsd_tree::reader");
        assert_eq!(record.run_id, None);
        assert_eq!(record.message.as_deref(), Some("read batch"));
        assert_eq!(record.fields["rows"], 3);
    }
}
