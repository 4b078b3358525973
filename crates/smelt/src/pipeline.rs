use crate::engine::{self, propagate};
use crate::{
    BoxedStage, FileRecord, Flow, PipelineError, Sink, SinkOptions, Source, SourceOptions, Stage,
};
use std::path::Path;
use tracing::debug;

/// An ordered chain of stages. The first stage generates, the rest receive.
///
/// A pipeline is itself a [`Stage`], so it can be piped into another
/// pipeline: as a generator it yields whatever survives its own chain, and
/// as a receiver it runs the unit it was handed through every stage.
pub struct Pipeline {
    name: String,
    stages: Vec<BoxedStage>,
    draining: Option<FileRecord>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new("pipeline")
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            draining: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn pipe(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Appends a [`Sink`] writing below `root`.
    pub fn dest(self, root: impl AsRef<Path>, options: SinkOptions) -> Self {
        self.pipe(Sink::new(root, options))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs the pipeline until its first stage is exhausted.
    pub fn drive(&mut self) -> Result<(), PipelineError> {
        let Some((generator, receivers)) = self.stages.split_first_mut() else {
            return Ok(());
        };
        debug!(pipeline = %self.name, stages = receivers.len() + 1, "driving pipeline");
        engine::drive(generator.as_mut(), receivers)
    }

    /// Yields the next unit that survives the inner chain.
    ///
    /// When an EOF unit comes back as bytes, the file is still draining: the
    /// following calls replay its EOF through the receivers until they hand
    /// back the EOF itself, before the inner generator is advanced again.
    fn generate(&mut self) -> Result<Flow, PipelineError> {
        let Some((generator, receivers)) = self.stages.split_first_mut() else {
            return Ok(Flow::Eos);
        };
        loop {
            let unit = match self.draining.take() {
                Some(file) => Flow::Eof(file),
                None => {
                    let unit = generator.advance(Flow::Eos)?;
                    if unit.is_eos() {
                        return Ok(Flow::Eos);
                    }
                    unit
                }
            };
            let upstream_eof = unit.is_eof();
            let output = propagate(receivers, unit)?;
            match &output {
                Flow::Eos => continue,
                Flow::Chunk(file, _) if upstream_eof => {
                    self.draining = Some(file.clone());
                }
                _ => {}
            }
            return Ok(output);
        }
    }
}

impl Stage for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        if input.is_eos() {
            self.generate()
        } else {
            propagate(&mut self.stages, input)
        }
    }
}

/// Starts a pipeline that reads `patterns` with default [`SourceOptions`].
pub fn source<I, P>(patterns: I) -> Pipeline
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    source_with_options(patterns, SourceOptions::default())
}

pub fn source_with_options<I, P>(patterns: I, options: SourceOptions) -> Pipeline
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    Pipeline::default().pipe(Source::new(patterns, options))
}
