//! Writers that render payloads.
//!
//! A [`Writer`] turns each payload into one line of output, either the
//! payload's printable summary or a JSON object. [`handler_for`] adapts any
//! writer into a tap handler.
//!
//! # Examples
//!
//! ```
//! use calltap::prelude::*;
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(Runtime::new());
//! let student = runtime.define_class("Student", None).unwrap();
//! let device = TappingDevice::new(runtime.clone());
//!
//! let writer = Arc::new(MemoryWriter::new(OutputFormat::Json));
//! device
//!     .tap_construction_of(&student, handler_for(writer.clone()), TapOptions::new())
//!     .unwrap();
//!
//! runtime.instantiate(&student, vec![]).unwrap();
//! assert_eq!(writer.lines().len(), 1);
//! ```

use crate::tap::Payload;
use crate::{Result, TapError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// How a payload is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary (default)
    #[default]
    Summary,
    /// One JSON object per payload
    Json,
}

impl OutputFormat {
    pub fn render(&self, payload: &Payload) -> Result<String> {
        match self {
            OutputFormat::Summary => Ok(payload.printable_summary()),
            OutputFormat::Json => payload.to_json(),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(TapError::Config(format!("unknown output format: {}", s))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Summary => write!(f, "summary"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Destination for rendered payloads
pub trait Writer: Send + Sync {
    fn write(&self, payload: &Payload) -> Result<()>;
}

impl<T: Writer + ?Sized> Writer for Arc<T> {
    fn write(&self, payload: &Payload) -> Result<()> {
        (**self).write(payload)
    }
}

/// Adapt `writer` into a tap handler
pub fn handler_for<W>(writer: W) -> impl Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static
where
    W: Writer + 'static,
{
    move |payload: &Payload| -> anyhow::Result<()> {
        writer.write(payload)?;
        Ok(())
    }
}

/// Writes one rendered line per payload to an `io::Write`
pub struct StreamWriter<W: Write + Send> {
    format: OutputFormat,
    stream: Mutex<W>,
}

impl<W: Write + Send> StreamWriter<W> {
    pub fn new(stream: W, format: OutputFormat) -> Self {
        Self {
            format,
            stream: Mutex::new(stream),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> W {
        self.stream.into_inner()
    }
}

impl StreamWriter<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl StreamWriter<File> {
    /// Append to the file at `path`, creating it if needed
    pub fn file(path: impl AsRef<Path>, format: OutputFormat) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file, format))
    }
}

impl<W: Write + Send> Writer for StreamWriter<W> {
    fn write(&self, payload: &Payload) -> Result<()> {
        let line = self.format.render(payload)?;
        let mut stream = self.stream.lock();
        writeln!(stream, "{}", line)?;
        stream.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> fmt::Debug for StreamWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter").field("format", &self.format).finish()
    }
}

/// Collects rendered payloads in memory
#[derive(Debug, Default)]
pub struct MemoryWriter {
    format: OutputFormat,
    lines: Mutex<Vec<String>>,
}

impl MemoryWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Writer for MemoryWriter {
    fn write(&self, payload: &Payload) -> Result<()> {
        let line = self.format.render(payload)?;
        self.lines.lock().push(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::TapOptions;
    use crate::testing::{construction_payload, student_world};
    use crate::TappingDevice;
    use serde_json::{json, Value};
    use std::fs;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("summary".parse::<OutputFormat>().unwrap(), OutputFormat::Summary);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().to_string(), "summary");
    }

    #[test]
    fn test_memory_writer_renders_json() {
        let world = student_world();
        let payload = construction_payload(&world);
        let writer = MemoryWriter::new(OutputFormat::Json);

        writer.write(&payload).unwrap();

        let lines = writer.lines();
        assert_eq!(lines.len(), 1);
        let value: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["method_name"], json!("initialize"));
        assert_eq!(value["kind"], json!("call_start"));
        assert_eq!(value["receiver"]["class"], json!("Student"));

        writer.clear();
        assert!(writer.lines().is_empty());
    }

    #[test]
    fn test_stream_writer_into_buffer() {
        let world = student_world();
        let payload = construction_payload(&world);
        let writer = StreamWriter::new(Vec::new(), OutputFormat::Summary);

        writer.write(&payload).unwrap();
        writer.write(&payload).unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(output.matches("Student#initialize (call)").count(), 2);
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_stream_writer_appends_to_file() {
        let world = student_world();
        let payload = construction_payload(&world);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taps.jsonl");

        StreamWriter::file(&path, OutputFormat::Json).unwrap().write(&payload).unwrap();
        StreamWriter::file(&path, OutputFormat::Json).unwrap().write(&payload).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["arguments"], json!([["name", "Stan"], ["age", 18]]));
        }
    }

    #[test]
    fn test_stream_writer_file_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("taps.log");

        let err = StreamWriter::file(&path, OutputFormat::Summary).unwrap_err();
        assert!(matches!(err, TapError::Io(_)));
    }

    #[test]
    fn test_handler_for_writer() {
        let world = student_world();
        let device = TappingDevice::new(world.runtime.clone());
        let stan = world.student("Stan", 18);
        let writer = Arc::new(MemoryWriter::new(OutputFormat::Summary));

        device
            .tap_calls_on(&stan, handler_for(writer.clone()), TapOptions::new())
            .unwrap();
        world.call(&stan, "age=", vec![json!(25)]);

        let lines = writer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Student#age= (return)"));
        assert!(lines[0].contains("Arguments: age: 25"));
    }
}
