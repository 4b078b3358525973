use crate::{Chunk, FileRecord, Flow, PipelineError, Stage};

/// Forwards every input untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl Stage for PassThrough {
    fn name(&self) -> &str {
        "pass_through"
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        Ok(input)
    }
}

/// Fails with a fixed message whenever it is called. Lets a pipeline
/// builder surface a construction problem from inside the pipeline.
#[derive(Clone, Debug)]
pub struct ErrorStage {
    message: String,
}

impl ErrorStage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Stage for ErrorStage {
    fn name(&self) -> &str {
        "error"
    }

    fn advance(&mut self, _input: Flow) -> Result<Flow, PipelineError> {
        Err(PipelineError::stage("error", self.message.clone()))
    }
}

pub struct FnStage<F> {
    name: String,
    advance: F,
}

impl<F> Stage for FnStage<F>
where
    F: FnMut(Flow) -> Result<Flow, PipelineError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        (self.advance)(input)
    }
}

/// Builds a stage from a closure, for stages that keep no state of their
/// own beyond what the closure captures.
pub fn stage_fn<F>(name: impl Into<String>, advance: F) -> FnStage<F>
where
    F: FnMut(Flow) -> Result<Flow, PipelineError> + Send,
{
    FnStage {
        name: name.into(),
        advance,
    }
}

/// Collects a whole file, rewrites it once at EOF, then hands the result
/// downstream at most `flush_size` bytes per EOF call.
///
/// Mid-file chunks are swallowed (the stage answers with [`Flow::Eos`]), so
/// nothing reaches later stages until the file is complete. The transform
/// receives the record and may rename it before the first byte leaves.
pub struct Buffered<F> {
    name: String,
    transform: F,
    flush_size: usize,
    pending: Option<PendingFile>,
}

struct PendingFile {
    file: FileRecord,
    input: Chunk,
    output: Option<Chunk>,
    flushed: usize,
}

impl PendingFile {
    fn new(file: FileRecord) -> Self {
        Self {
            file,
            input: Chunk::new(),
            output: None,
            flushed: 0,
        }
    }
}

impl<F> Buffered<F>
where
    F: FnMut(&FileRecord, Chunk) -> Result<Chunk, PipelineError> + Send,
{
    pub fn new(name: impl Into<String>, transform: F) -> Self {
        Self {
            name: name.into(),
            transform,
            flush_size: 0,
            pending: None,
        }
    }

    /// Zero flushes the whole output in one call.
    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size;
        self
    }

    fn pending_for(&mut self, file: &FileRecord) -> &mut PendingFile {
        let stale = self
            .pending
            .as_ref()
            .is_some_and(|pending| !pending.file.same_file(file));
        if stale {
            self.pending = None;
        }
        self.pending
            .get_or_insert_with(|| PendingFile::new(file.clone()))
    }

    fn flush(&mut self, file: FileRecord) -> Result<Flow, PipelineError> {
        let flush_size = self.flush_size;
        let mut pending = match self.pending.take() {
            Some(pending) if pending.file.same_file(&file) => pending,
            _ => PendingFile::new(file.clone()),
        };

        let output = match pending.output.take() {
            Some(output) => output,
            None => {
                let input = std::mem::take(&mut pending.input);
                (self.transform)(&file, input)?
            }
        };

        let remaining = output.len() - pending.flushed;
        if remaining == 0 {
            // Drained files stay pending with empty output until another
            // record arrives, so replayed EOFs never rerun the transform.
            pending.output = Some(Chunk::new());
            pending.flushed = 0;
            self.pending = Some(pending);
            return Ok(Flow::Eof(file));
        }
        let take = if flush_size == 0 {
            remaining
        } else {
            remaining.min(flush_size)
        };
        let start = pending.flushed;
        let chunk = output[start..start + take].to_vec();
        pending.flushed += take;
        pending.output = Some(output);
        self.pending = Some(pending);
        Ok(Flow::Chunk(file, chunk))
    }
}

impl<F> Stage for Buffered<F>
where
    F: FnMut(&FileRecord, Chunk) -> Result<Chunk, PipelineError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        match input {
            Flow::Eos => Ok(Flow::Eos),
            Flow::Chunk(file, chunk) => {
                self.pending_for(&file).input.extend_from_slice(&chunk);
                Ok(Flow::Eos)
            }
            Flow::Eof(file) => self.flush(file),
        }
    }
}
