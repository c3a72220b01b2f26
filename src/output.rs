use formatx::formatx;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

pub trait Output: Debug {
    /// A fresh writer for the location key, replacing any previous content.
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// A writer appending to the location key's existing content - used by
    /// batched exports where the first batch creates the file and header and
    /// every later batch appends rows.
    fn appender_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }

    fn path_for(&self, location_key: &str) -> PathBuf {
        self.directory_path
            .join(formatx!(&self.file_template, location_key).unwrap())
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        std::fs::create_dir_all(&self.directory_path)?;
        Ok(io::BufWriter::new(File::create(
            self.path_for(location_key),
        )?))
    }

    fn appender_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(location_key))?,
        ))
    }
}

impl Output for &FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_location_key(self, location_key)
    }

    fn appender_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::appender_for_location_key(self, location_key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn appender_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Collects everything written per location key in memory; the test double
/// for export assertions.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutput {
    buffers: Arc<Mutex<indexmap::IndexMap<String, Vec<u8>>>>,
}

impl MemoryOutput {
    pub fn content(&self, location_key: &str) -> Option<String> {
        self.buffers
            .lock()
            .get(location_key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.buffers.lock().keys().cloned().collect()
    }
}

#[derive(Debug)]
pub struct MemoryWriter {
    key: String,
    buffers: Arc<Mutex<indexmap::IndexMap<String, Vec<u8>>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffers
            .lock()
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output for MemoryOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        self.buffers.lock().insert(location_key.to_owned(), Vec::new());
        Ok(MemoryWriter {
            key: location_key.to_owned(),
            buffers: self.buffers.clone(),
        })
    }

    fn appender_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        Ok(MemoryWriter {
            key: location_key.to_owned(),
            buffers: self.buffers.clone(),
        })
    }
}

impl Output for &MemoryOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <MemoryOutput as Output>::writer_for_location_key(self, location_key)
    }

    fn appender_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <MemoryOutput as Output>::appender_for_location_key(self, location_key)
    }
}
