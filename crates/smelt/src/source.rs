use crate::paths::{clean_path, common_base, has_glob_meta, literal_base, relative_directory};
use crate::{Chunk, FileRecord, Flow, PipelineError, SourceOptions, Stage};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Generator that streams files from disk in bounded chunks.
///
/// Blocking reads happen on a dedicated worker thread. Every generator call
/// sends the worker one request and waits for exactly one reply, so at most
/// one chunk is ever in flight and disk I/O is paced by the pipeline.
pub struct Source {
    patterns: Vec<String>,
    base: PathBuf,
    chunk_size: usize,
    worker: Option<SourceWorker>,
    exhausted: bool,
}

impl Source {
    pub fn new<I, P>(patterns: I, options: SourceOptions) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|pattern| clean_path(pattern).to_string_lossy().into_owned())
            .collect();
        let base = match options.base.as_deref() {
            Some(base) => clean_path(base),
            None => common_base(patterns.iter().map(|pattern| literal_base(pattern))),
        };
        Self {
            patterns,
            base,
            chunk_size: options.effective_chunk_size(),
            worker: None,
            exhausted: false,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn next_from_worker(&mut self) -> Result<Flow, PipelineError> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => SourceWorker::spawn(ReadCursor::new(
                &self.patterns,
                self.base.clone(),
                self.chunk_size,
            ))?,
        };
        let worker = self.worker.insert(worker);
        let reply = worker.request()?;

        if let (Some(file), Some(error)) = (&reply.file, &reply.error) {
            warn!(file = %file.original_name(), %error, "skipping unreadable source file");
        }
        let flow = reply.into_flow()?;
        if flow.is_eos() {
            self.exhausted = true;
            self.worker = None;
        }
        Ok(flow)
    }
}

impl Stage for Source {
    fn name(&self) -> &str {
        "source"
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        if !input.is_eos() {
            return Ok(input);
        }
        if self.exhausted {
            return Ok(Flow::Eos);
        }
        self.next_from_worker()
    }
}

struct ReadyForChunk;

/// One `(file, chunk, error)` answer from the worker. No file means the
/// worker ran out of paths; a file without a chunk is that file's EOF.
struct ReadReply {
    file: Option<FileRecord>,
    chunk: Option<Chunk>,
    error: Option<PipelineError>,
}

impl ReadReply {
    fn end_of_stream() -> Self {
        Self {
            file: None,
            chunk: None,
            error: None,
        }
    }

    fn data(file: FileRecord, chunk: Option<Chunk>) -> Self {
        Self {
            file: Some(file),
            chunk,
            error: None,
        }
    }

    fn failed(file: Option<FileRecord>, error: PipelineError) -> Self {
        Self {
            file,
            chunk: None,
            error: Some(error),
        }
    }

    fn into_flow(self) -> Result<Flow, PipelineError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(match (self.file, self.chunk) {
            (Some(file), Some(chunk)) => Flow::Chunk(file, chunk),
            (Some(file), None) => Flow::Eof(file),
            (None, _) => Flow::Eos,
        })
    }
}

struct SourceWorker {
    requests: Option<Sender<ReadyForChunk>>,
    replies: Receiver<ReadReply>,
    join: Option<JoinHandle<()>>,
}

impl SourceWorker {
    fn spawn(mut cursor: ReadCursor) -> Result<Self, PipelineError> {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<ReadyForChunk>(0);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<ReadReply>(0);
        let join = std::thread::Builder::new()
            .name("smelt-source".to_string())
            .spawn(move || {
                while request_rx.recv().is_ok() {
                    if reply_tx.send(cursor.next_reply()).is_err() {
                        break;
                    }
                }
            })
            .map_err(|error| PipelineError::Worker(format!("failed to spawn reader: {error}")))?;
        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            join: Some(join),
        })
    }

    fn request(&self) -> Result<ReadReply, PipelineError> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| PipelineError::Worker("reader already shut down".to_string()))?;
        requests
            .send(ReadyForChunk)
            .map_err(|_| PipelineError::Worker("reader stopped before accepting a request".to_string()))?;
        self.replies
            .recv()
            .map_err(|_| PipelineError::Worker("reader stopped before replying".to_string()))
    }
}

impl Drop for SourceWorker {
    fn drop(&mut self) {
        // Closing the request channel is the worker's shutdown signal.
        self.requests.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

enum Pending {
    Pattern(String),
    Path(PathBuf),
}

struct OpenFile {
    file: FileRecord,
    path: PathBuf,
    reader: BufReader<File>,
}

/// Worker-side state: the remaining work list and the file being read.
struct ReadCursor {
    pending: VecDeque<Pending>,
    base: PathBuf,
    chunk_size: usize,
    current: Option<OpenFile>,
}

impl ReadCursor {
    fn new(patterns: &[String], base: PathBuf, chunk_size: usize) -> Self {
        Self {
            pending: patterns.iter().cloned().map(Pending::Pattern).collect(),
            base,
            chunk_size,
            current: None,
        }
    }

    fn next_reply(&mut self) -> ReadReply {
        if let Some(open) = self.current.as_mut() {
            return match read_chunk(&mut open.reader, self.chunk_size) {
                Ok(Some(chunk)) => ReadReply::data(open.file.clone(), Some(chunk)),
                Ok(None) => match self.current.take() {
                    Some(finished) => ReadReply::data(finished.file, None),
                    None => ReadReply::end_of_stream(),
                },
                Err(source) => {
                    let failed = self.current.take();
                    let path = failed
                        .as_ref()
                        .map(|open| open.path.clone())
                        .unwrap_or_default();
                    ReadReply::failed(
                        failed.map(|open| open.file),
                        PipelineError::Read { path, source },
                    )
                }
            };
        }

        loop {
            let Some(next) = self.pending.pop_front() else {
                return ReadReply::end_of_stream();
            };
            let path = match next {
                Pending::Pattern(pattern) if has_glob_meta(&pattern) => {
                    match expand_glob(&pattern) {
                        Ok(paths) => {
                            for path in paths.into_iter().rev() {
                                self.pending.push_front(Pending::Path(path));
                            }
                            continue;
                        }
                        Err(error) => return ReadReply::failed(None, error),
                    }
                }
                Pending::Pattern(pattern) => PathBuf::from(pattern),
                Pending::Path(path) => path,
            };
            return self.open(path);
        }
    }

    fn open(&mut self, path: PathBuf) -> ReadReply {
        let file = FileRecord::from_path(&path);
        file.set_directory(relative_directory(&file.original_directory(), &self.base));
        debug!(path = %path.display(), "opening source file");

        match File::open(&path) {
            Ok(handle) => {
                self.current = Some(OpenFile {
                    file,
                    path,
                    reader: BufReader::new(handle),
                });
                self.next_reply()
            }
            Err(source) => ReadReply::failed(Some(file), PipelineError::Read { path, source }),
        }
    }
}

fn read_chunk(reader: &mut impl Read, chunk_size: usize) -> io::Result<Option<Chunk>> {
    let mut chunk = Chunk::with_capacity(chunk_size);
    reader.take(chunk_size as u64).read_to_end(&mut chunk)?;
    Ok((!chunk.is_empty()).then_some(chunk))
}

/// Expands one glob pattern into the files it matches, in the glob crate's
/// (alphabetical) order. Matched directories are skipped.
fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = glob::glob(pattern).map_err(|error| PipelineError::Glob {
        pattern: pattern.to_string(),
        message: error.to_string(),
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|error| PipelineError::Read {
            path: error.path().to_path_buf(),
            source: error.into_error(),
        })?;
        if !path.is_dir() {
            paths.push(clean_path(path));
        }
    }
    Ok(paths)
}
