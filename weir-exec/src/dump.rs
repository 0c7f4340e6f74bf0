//! Columnar dump orchestration.
//!
//! The engine side owns file rotation, batching and failure cleanup; the
//! actual Parquet/Arrow encoding sits behind [`DumpWriter`], provided by an
//! external collaborator. Produced paths are reported through the standard
//! emit path as single-column `file_name` records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use weir_types::{DataType, Record, RecordMeta, Text, Value};

use crate::error::Result;
use crate::io::RecordWriter;

/// Output format of a dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpFileFormat {
    /// Apache Parquet.
    #[default]
    Parquet,
    /// Apache Arrow IPC.
    Arrow,
}

impl DumpFileFormat {
    /// File extension for produced paths.
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Arrow => "arrow",
        }
    }
}

/// Dump tuning knobs.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Output format.
    pub format: DumpFileFormat,
    /// Rotate to a new file after this many records; unlimited when absent.
    pub max_records_per_file: Option<u64>,
    /// Records per row group / record batch.
    pub record_batch_size: usize,
    /// Encode `CHAR(n)` as Arrow fixed-size binary instead of variable
    /// binary/string.
    pub arrow_use_fixed_size_binary_for_char: bool,
    /// Keep already-produced files when the dump fails midway.
    pub keep_files_on_error: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            format: DumpFileFormat::Parquet,
            max_records_per_file: None,
            record_batch_size: 10_000,
            arrow_use_fixed_size_binary_for_char: false,
            keep_files_on_error: false,
        }
    }
}

/// Columnar file writer contract.
pub trait DumpWriter: Send {
    /// Opens a new output file.
    fn open(&mut self, path: &Path, meta: &RecordMeta, config: &DumpConfig) -> Result<()>;

    /// Writes one record batch into the open file.
    fn write_batch(&mut self, records: &[Record]) -> Result<()>;

    /// Finishes the open file.
    fn close(&mut self) -> Result<()>;
}

/// The layout of file-metadata records: a single `file_name` column.
pub fn file_name_meta() -> Arc<RecordMeta> {
    Arc::new(RecordMeta::new([DataType::character_varying()]))
}

/// Drives one dump: batching, rotation, failure cleanup and file-name emit.
pub struct Dumper {
    config: DumpConfig,
    directory: PathBuf,
    prefix: String,
}

impl Dumper {
    /// Creates a dumper producing `prefix_NNN.ext` files under `directory`.
    pub fn new(config: DumpConfig, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self { config, directory: directory.into(), prefix: prefix.into() }.normalize()
    }

    fn normalize(mut self) -> Self {
        if self.prefix.is_empty() {
            self.prefix = "dump".into();
        }
        self
    }

    fn path_for(&self, sequence: usize) -> PathBuf {
        self.directory
            .join(format!("{}_{sequence}.{}", self.prefix, self.config.format.extension()))
    }

    /// Writes `records` through `writer`, emitting one `file_name` record per
    /// produced file into `file_name_sink`.
    pub fn dump(
        &self,
        meta: &RecordMeta,
        records: &[Record],
        writer: &mut dyn DumpWriter,
        file_name_sink: &mut dyn RecordWriter,
    ) -> Result<Vec<PathBuf>> {
        let mut produced: Vec<PathBuf> = Vec::new();
        let result = self.dump_inner(meta, records, writer, file_name_sink, &mut produced);
        if let Err(e) = result {
            if !self.config.keep_files_on_error {
                for path in &produced {
                    let _ = std::fs::remove_file(path);
                }
                produced.clear();
            }
            return Err(e);
        }
        Ok(produced)
    }

    fn dump_inner(
        &self,
        meta: &RecordMeta,
        records: &[Record],
        writer: &mut dyn DumpWriter,
        file_name_sink: &mut dyn RecordWriter,
        produced: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let per_file = self.config.max_records_per_file.unwrap_or(u64::MAX).max(1) as usize;
        let batch = self.config.record_batch_size.max(1);
        let mut sequence = 0usize;
        let mut written = 0usize;
        for file_records in records.chunks(per_file.min(records.len().max(1))) {
            let path = self.path_for(sequence);
            sequence += 1;
            writer.open(&path, meta, &self.config)?;
            for chunk in file_records.chunks(batch) {
                writer.write_batch(chunk)?;
                written += chunk.len();
            }
            writer.close()?;
            produced.push(path.clone());
            file_name_sink.write(Record::new(vec![Value::Character(Text::from(
                path.to_string_lossy().into_owned(),
            ))]));
        }
        debug_assert_eq!(written, records.len());
        file_name_sink.flush();
        Ok(())
    }
}

impl core::fmt::Debug for Dumper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dumper")
            .field("directory", &self.directory)
            .field("prefix", &self.prefix)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecError, Status};
    use crate::io::CollectingWriter;
    use std::sync::Mutex;

    /// Retains batches in memory instead of encoding columnar files.
    #[derive(Default)]
    pub struct MockDumpWriter {
        pub files: Arc<Mutex<Vec<(PathBuf, Vec<Record>)>>>,
        current: Option<(PathBuf, Vec<Record>)>,
        pub fail_on_file: Option<usize>,
        opened: usize,
    }

    impl DumpWriter for MockDumpWriter {
        fn open(&mut self, path: &Path, _meta: &RecordMeta, _config: &DumpConfig) -> Result<()> {
            if self.fail_on_file == Some(self.opened) {
                return Err(ExecError::new(Status::IoError, "simulated writer failure"));
            }
            self.opened += 1;
            self.current = Some((path.to_path_buf(), Vec::new()));
            Ok(())
        }

        fn write_batch(&mut self, records: &[Record]) -> Result<()> {
            self.current
                .as_mut()
                .expect("open before write")
                .1
                .extend(records.iter().cloned());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            let finished = self.current.take().expect("open before close");
            self.files.lock().expect("poisoned").push(finished);
            Ok(())
        }
    }

    fn meta() -> RecordMeta {
        RecordMeta::new([DataType::Int8])
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::new(vec![Value::Int8(i as i64)])).collect()
    }

    #[test]
    fn rotates_at_max_records_per_file() {
        let config = DumpConfig {
            max_records_per_file: Some(2),
            record_batch_size: 1,
            ..DumpConfig::default()
        };
        let dumper = Dumper::new(config, "/tmp/weir-dump", "t");
        let mut writer = MockDumpWriter::default();
        let sink = CollectingWriter::new();
        let mut sink_handle = sink.clone();
        let produced = dumper
            .dump(&meta(), &records(5), &mut writer, &mut sink_handle)
            .unwrap();
        assert_eq!(produced.len(), 3);
        let files = writer.files.lock().unwrap();
        assert_eq!(files[0].1.len(), 2);
        assert_eq!(files[2].1.len(), 1);
        // one file_name record per produced file
        assert_eq!(sink.records().len(), 3);
        assert!(produced[0].to_string_lossy().ends_with("t_0.parquet"));
    }

    #[test]
    fn failure_reports_error_and_emits_nothing_extra() {
        let config = DumpConfig {
            max_records_per_file: Some(1),
            keep_files_on_error: true,
            ..DumpConfig::default()
        };
        let dumper = Dumper::new(config, "/tmp/weir-dump", "t");
        let mut writer = MockDumpWriter { fail_on_file: Some(1), ..MockDumpWriter::default() };
        let sink = CollectingWriter::new();
        let mut sink_handle = sink.clone();
        let err = dumper
            .dump(&meta(), &records(3), &mut writer, &mut sink_handle)
            .unwrap_err();
        assert_eq!(err.status, Status::IoError);
        // the first file was produced before the failure
        assert_eq!(writer.files.lock().unwrap().len(), 1);
    }

    #[test]
    fn arrow_format_extension() {
        let config = DumpConfig { format: DumpFileFormat::Arrow, ..DumpConfig::default() };
        let dumper = Dumper::new(config, "/tmp", "x");
        assert!(dumper.path_for(7).to_string_lossy().ends_with("x_7.arrow"));
    }
}
