use crate::paths::clean_path;
use crate::{FileRecord, Flow, PipelineError, SinkOptions, Stage};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Terminal stage that writes every file it receives below a root directory.
///
/// A destination path is `root / directory / name`, taken from the record
/// when its first bytes (or its EOF) arrive. Renames after that point do not
/// move the file. The sink never forwards anything.
pub struct Sink {
    root: PathBuf,
    options: SinkOptions,
    prepared: bool,
    open: Option<Destination>,
    last_closed: Option<FileRecord>,
}

struct Destination {
    file: FileRecord,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Sink {
    pub fn new(root: impl AsRef<Path>, options: SinkOptions) -> Self {
        Self {
            root: clean_path(root),
            options,
            prepared: false,
            open: None,
            last_closed: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn prepare(&mut self) -> Result<(), PipelineError> {
        if self.prepared {
            return Ok(());
        }
        if self.options.clean {
            match fs::remove_dir_all(&self.root) {
                Ok(()) => debug!(root = %self.root.display(), "cleaned destination"),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(PipelineError::Destination {
                        path: self.root.clone(),
                        source,
                    });
                }
            }
        }
        fs::create_dir_all(&self.root).map_err(|source| PipelineError::Destination {
            path: self.root.clone(),
            source,
        })?;
        self.prepared = true;
        Ok(())
    }

    fn destination_for(&mut self, file: &FileRecord) -> Result<&mut Destination, PipelineError> {
        let destination = match self.open.take() {
            Some(open) if open.file.same_file(file) => open,
            previous => {
                self.open = previous;
                self.close()?;
                self.open_destination(file)?
            }
        };
        Ok(self.open.insert(destination))
    }

    fn open_destination(&self, file: &FileRecord) -> Result<Destination, PipelineError> {
        let directory = clean_path(self.root.join(file.directory()));
        fs::create_dir_all(&directory).map_err(|source| PipelineError::Destination {
            path: directory.clone(),
            source,
        })?;

        let path = directory.join(file.name());
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => {
                return Err(PipelineError::DestinationIsDirectory { path });
            }
            Ok(_) if !self.options.overwrite => {
                return Err(PipelineError::DestinationExists { path });
            }
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(PipelineError::Destination { path, source }),
        }

        let handle = File::create(&path).map_err(|source| PipelineError::Destination {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "opened destination file");
        Ok(Destination {
            file: file.clone(),
            path,
            writer: BufWriter::new(handle),
        })
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        let Some(destination) = self.open.take() else {
            return Ok(());
        };
        let Destination { file, path, writer } = destination;
        writer.into_inner().map_err(|error| PipelineError::Write {
            path,
            source: error.into_error(),
        })?;
        self.last_closed = Some(file);
        Ok(())
    }

    fn write(&mut self, file: &FileRecord, bytes: &[u8]) -> Result<(), PipelineError> {
        let destination = self.destination_for(file)?;
        destination
            .writer
            .write_all(bytes)
            .map_err(|source| PipelineError::Write {
                path: destination.path.clone(),
                source,
            })
    }

    fn finish(&mut self, file: &FileRecord) -> Result<(), PipelineError> {
        let already_closed = self
            .last_closed
            .as_ref()
            .is_some_and(|closed| closed.same_file(file));
        let open_here = self
            .open
            .as_ref()
            .is_some_and(|open| open.file.same_file(file));
        if already_closed && !open_here {
            return Ok(());
        }
        // A file that never carried bytes still gets an (empty) destination.
        self.destination_for(file)?;
        self.close()
    }
}

impl Stage for Sink {
    fn name(&self) -> &str {
        "sink"
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        match input {
            Flow::Eos => {}
            Flow::Chunk(file, bytes) => {
                self.prepare()?;
                self.write(&file, &bytes)?;
            }
            Flow::Eof(file) => {
                self.prepare()?;
                self.finish(&file)?;
            }
        }
        Ok(Flow::Eos)
    }
}
