use crate::{FileRecord, PipelineError};

pub type Chunk = Vec<u8>;

/// What travels between two stages on a single call.
///
/// As a stage *input*, `Eos` means the stage is being asked to act as a
/// generator. As an *output*, `Eos` means the stage has nothing to forward.
#[derive(Clone, Debug)]
pub enum Flow {
    Chunk(FileRecord, Chunk),
    Eof(FileRecord),
    Eos,
}

impl Flow {
    pub fn file(&self) -> Option<&FileRecord> {
        match self {
            Flow::Chunk(file, _) | Flow::Eof(file) => Some(file),
            Flow::Eos => None,
        }
    }

    pub fn chunk(&self) -> Option<&[u8]> {
        match self {
            Flow::Chunk(_, chunk) => Some(chunk),
            _ => None,
        }
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, Flow::Chunk(..))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Flow::Eof(_))
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, Flow::Eos)
    }
}

/// A single link of a pipeline.
///
/// The same stage acts as a generator when called with [`Flow::Eos`] and as
/// a receiver when called with a file. A receiver may mutate the record it
/// was given but must hand back that same record (or [`Flow::Eos`]).
pub trait Stage: Send {
    fn name(&self) -> &str;

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError>;
}

pub type BoxedStage = Box<dyn Stage>;

impl<S> Stage for Box<S>
where
    S: Stage + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn advance(&mut self, input: Flow) -> Result<Flow, PipelineError> {
        (**self).advance(input)
    }
}
