// In: src/components/recorder.rs

//! The `recorder` sink: writes every record it receives to a file or to stdout.
//!
//! CSV output has one row per reading:
//!
//! ```text
//! sequence,elapsed_ns,reading,value,tags
//! 0,1200,counter,0,host.pid=4242;host.version=0x10006
//! ```
//!
//! JSONL output has one serialized `Record` per line.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ComponentError;
use crate::pipeline::{attach, EndpointError, Inlet, Module, Received, Record, Stage, StageContext};

const CSV_HEADER: &str = "sequence,elapsed_ns,reading,value,tags";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    #[default]
    Csv,
    Jsonl,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    /// Output file. Records go to stdout when unset.
    #[serde(default)]
    pub filename: Option<PathBuf>,

    #[serde(default)]
    pub format: RecordFormat,

    #[serde(default)]
    pub append: bool,

    /// Write the CSV header before the first row (skipped when appending to a
    /// non-empty file).
    #[serde(default = "default_header")]
    pub header: bool,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            filename: None,
            format: RecordFormat::Csv,
            append: false,
            header: default_header(),
        }
    }
}

fn default_header() -> bool {
    true
}

pub struct Recorder {
    writer: Box<dyn Write + Send>,
    format: RecordFormat,
    header_pending: bool,
    written: u64,
    inlet: Option<Inlet>,
}

impl Recorder {
    fn write(&mut self, record: &Record) -> io::Result<()> {
        match self.format {
            RecordFormat::Csv => self.write_csv(record)?,
            RecordFormat::Jsonl => {
                serde_json::to_writer(&mut self.writer, record)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    fn write_csv(&mut self, record: &Record) -> io::Result<()> {
        if self.header_pending {
            writeln!(self.writer, "{}", CSV_HEADER)?;
            self.header_pending = false;
        }

        let tags = record
            .tags
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(";");
        let elapsed_ns = record.elapsed.as_nanos();

        if record.readings.is_empty() {
            writeln!(self.writer, "{},{},,,{}", record.sequence, elapsed_ns, tags)?;
        }
        for reading in &record.readings {
            writeln!(
                self.writer,
                "{},{},{},{},{}",
                record.sequence, elapsed_ns, reading.name, reading.value, tags
            )?;
        }
        Ok(())
    }
}

impl Stage for Recorder {
    fn connect_input(&mut self, inlet: Inlet) -> Result<(), EndpointError> {
        attach(&mut self.inlet, inlet)
    }

    fn run(mut self: Box<Self>, ctx: StageContext) -> Result<(), ComponentError> {
        let Some(inlet) = self.inlet.take() else {
            return Err("recorder has no input".into());
        };

        if ctx.state.wait_for_start() {
            while ctx.state.is_running() {
                match ctx.recv(&inlet) {
                    Received::Record(record) => self.write(&record)?,
                    Received::Empty => {}
                    Received::Closed => break,
                }
            }
        }

        // The upstream stage drops its outlet on exit, which ends the drain.
        loop {
            match ctx.recv(&inlet) {
                Received::Record(record) => self.write(&record)?,
                Received::Empty => {}
                Received::Closed => break,
            }
        }
        self.writer.flush()?;
        log::debug!("Recorder wrote {} records", self.written);
        Ok(())
    }
}

impl Module for Recorder {
    const NAME: &'static str = "recorder";
    type Settings = RecorderSettings;

    fn build(settings: RecorderSettings) -> Result<Self, ComponentError> {
        let mut header_pending = settings.format == RecordFormat::Csv && settings.header;

        let writer: Box<dyn Write + Send> = match &settings.filename {
            Some(path) => {
                let mut options = OpenOptions::new();
                options.create(true);
                if settings.append {
                    options.append(true);
                } else {
                    options.write(true).truncate(true);
                }
                let file = options.open(path).map_err(|err| {
                    io::Error::new(err.kind(), format!("{}: {}", path.display(), err))
                })?;
                if settings.append && file.metadata()?.len() > 0 {
                    header_pending = false;
                }
                Box::new(BufWriter::new(file))
            }
            None => Box::new(io::stdout()),
        };

        Ok(Self {
            writer,
            format: settings.format,
            header_pending,
            written: 0,
            inlet: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crossbeam_channel::unbounded;
    use std::fs;
    use std::time::Duration;

    fn record(sequence: u64) -> Record {
        let mut record = Record::new(sequence, Duration::from_nanos(1_000 + sequence))
            .with_reading("counter", sequence as f64);
        record.tag("host.pid", "42");
        record
    }

    /// Builds a recorder, queues `records`, closes the link and runs it against
    /// a stopped pipeline, which exercises the drain-on-exit path.
    fn record_all(settings: RecorderSettings, records: Vec<Record>) {
        let mut recorder = Recorder::build(settings).unwrap();
        let (to_recorder, inlet) = unbounded();
        recorder.connect_input(inlet).unwrap();
        for record in records {
            to_recorder.send(record).unwrap();
        }
        drop(to_recorder);

        let state = State::new_handle();
        state.stop().unwrap();
        let ctx = StageContext {
            index: 3,
            state,
            poll_interval: Duration::from_millis(5),
        };
        Box::new(recorder).run(ctx).unwrap();
    }

    #[test]
    fn test_csv_output_has_header_and_one_row_per_reading() {
        // 1. Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let settings = RecorderSettings {
            filename: Some(path.clone()),
            ..Default::default()
        };

        // 2. Act
        record_all(settings, vec![record(0), record(1)]);

        // 3. Assert
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                CSV_HEADER,
                "0,1000,counter,0,host.pid=42",
                "1,1001,counter,1,host.pid=42",
            ]
        );
    }

    #[test]
    fn test_jsonl_output_roundtrips_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let settings = RecorderSettings {
            filename: Some(path.clone()),
            format: RecordFormat::Jsonl,
            ..Default::default()
        };

        record_all(settings, vec![record(7)]);

        let text = fs::read_to_string(&path).unwrap();
        let back: Record = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(back, record(7));
    }

    #[test]
    fn test_appending_skips_the_header_for_non_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let settings = RecorderSettings {
            filename: Some(path.clone()),
            append: true,
            ..Default::default()
        };

        record_all(settings.clone(), vec![record(0)]);
        record_all(settings, vec![record(1)]);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|line| *line == CSV_HEADER).count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_records_sent_after_stop_are_written_before_exit() {
        // 1. Arrange: upstream is still flushing when the recorder sees `Stopped`
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.csv");
        let mut recorder = Recorder::build(RecorderSettings {
            filename: Some(path.clone()),
            header: false,
            ..Default::default()
        })
        .unwrap();
        let (to_recorder, inlet) = unbounded();
        recorder.connect_input(inlet).unwrap();

        let state = State::new_handle();
        state.stop().unwrap();
        let upstream = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            to_recorder.send(record(0)).unwrap();
            to_recorder.send(record(1)).unwrap();
        });

        // 2. Act
        let ctx = StageContext {
            index: 3,
            state,
            poll_interval: Duration::from_millis(5),
        };
        Box::new(recorder).run(ctx).unwrap();
        upstream.join().unwrap();

        // 3. Assert
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_unopenable_file_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RecorderSettings {
            filename: Some(dir.path().join("missing").join("out.csv")),
            ..Default::default()
        };
        let err = Recorder::build(settings).err().unwrap();
        assert!(err.to_string().contains("out.csv"));
    }
}
