use crate::{Chunk, FileRecord, Flow, PipelineError, Stage};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

const MOCK_ERROR_PREFIX: &str = "error: ";

/// A generator of in-memory files.
///
/// Each name in `files` becomes one file. Its content is taken from the
/// matching entry of `contents`, or synthesized as `"<name> content"` once
/// the contents run out. A content starting with `error: ` makes the stage
/// fail for that file instead, with the rest of the string as the message.
/// In receiver role the stage forwards its input untouched.
#[derive(Debug, Default)]
pub struct MockStage {
    files: VecDeque<String>,
    contents: VecDeque<String>,
    chunk_size: usize,
    current: Option<MockFile>,
}

#[derive(Debug)]
struct MockFile {
    file: FileRecord,
    content: Chunk,
    offset: usize,
}

impl MockStage {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_contents<I, S>(mut self, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contents = contents.into_iter().map(Into::into).collect();
        self
    }

    /// Zero emits each file as one chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn next_unit(&mut self) -> Result<Flow, PipelineError> {
        if self.current.is_none() {
            let Some(name) = self.files.pop_front() else {
                return Ok(Flow::Eos);
            };
            let content = self
                .contents
                .pop_front()
                .unwrap_or_else(|| format!("{name} content"));
            if let Some(message) = content.strip_prefix(MOCK_ERROR_PREFIX) {
                return Err(PipelineError::stage(
                    "mock",
                    format!("mock error for '{name}': {message}"),
                ));
            }
            self.current = Some(MockFile {
                file: FileRecord::from_path(&name),
                content: content.into_bytes(),
                offset: 0,
            });
        }

        let Some(current) = self.current.as_mut() else {
            return Ok(Flow::Eos);
        };
        let remaining = current.content.len() - current.offset;
        if remaining == 0 {
            let finished = self.current.take().map(|mock| mock.file);
            return Ok(finished.map_or(Flow::Eos, Flow::Eof));
        }
        let take = match self.chunk_size {
            0 => remaining,
            size => remaining.min(size),
        };
        let chunk = current.content[current.offset..current.offset + take].to_vec();
        current.offset += take;
        Ok(Flow::Chunk(current.file.clone(), chunk))
    }
}

impl Stage for MockStage {
    fn name(&self) -> &str {
        "mock"
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        match input {
            Flow::Eos => self.next_unit(),
            incoming => Ok(incoming),
        }
    }
}

/// Terminal receiver that records every flow it is handed and forwards
/// nothing. Clones share the same record, so a test can keep one clone and
/// pipe the other.
#[derive(Clone, Debug, Default)]
pub struct Collector {
    flows: Arc<Mutex<Vec<Flow>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flows(&self) -> Vec<Flow> {
        self.flows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the files that reached EOF, in order, as named at that EOF.
    pub fn eof_names(&self) -> Vec<String> {
        self.flows()
            .iter()
            .filter(|flow| flow.is_eof())
            .filter_map(|flow| flow.file().map(FileRecord::name))
            .collect()
    }

    /// Concatenated bytes per file name. Files that only ever signalled EOF
    /// map to an empty buffer.
    pub fn contents_by_name(&self) -> BTreeMap<String, Chunk> {
        let mut contents = BTreeMap::<String, Chunk>::new();
        for flow in self.flows() {
            match flow {
                Flow::Chunk(file, chunk) => contents
                    .entry(file.name())
                    .or_default()
                    .extend_from_slice(&chunk),
                Flow::Eof(file) => {
                    contents.entry(file.name()).or_default();
                }
                Flow::Eos => {}
            }
        }
        contents
    }
}

impl Stage for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        if !input.is_eos() {
            self.flows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(input);
        }
        Ok(Flow::Eos)
    }
}
