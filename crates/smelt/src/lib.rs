#![doc = r#"
Streaming file-transformation pipelines and a dependency-ordered task runner.

Stage roles:

| Stage | Generator role (`Flow::Eos` in) | Receiver role (file in) |
| --- | --- | --- |
| `Source` | reads the next chunk from disk | forwards input |
| `Sink` | `Flow::Eos` | writes bytes, closes on EOF, returns `Flow::Eos` |
| `Pipeline` | pulls through its own chain | runs input through every stage |
| `Buffered` | `Flow::Eos` | swallows chunks, flushes on repeated EOF |

Implementation notes:
- Files are shared `FileRecord` handles. A receiver may rename the record it
  was given but must never hand back a different one.
- An EOF pass that streamed bytes and ended in `Flow::Eos` is replayed until
  no receiver emits bytes, which lets buffering stages drain.
- The only thread is each `Source`'s reader, paced one chunk per request.
"#]

pub mod config;
pub mod engine;
pub mod errors;
pub mod file;
pub mod paths;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stage;
pub mod tasks;
pub mod testing;
pub mod transforms;

pub use config::{DEFAULT_CHUNK_SIZE, SinkOptions, SourceOptions};
pub use engine::drive;
pub use errors::{HandlerError, PipelineError, TaskError};
pub use file::{FileContext, FileRecord, FileSnapshot};
pub use pipeline::{Pipeline, source, source_with_options};
pub use sink::Sink;
pub use source::Source;
pub use stage::{BoxedStage, Chunk, Flow, Stage};
pub use tasks::{DEFAULT_TASK, TaskHandler, TaskRunner};
pub use transforms::{Buffered, ErrorStage, FnStage, PassThrough, stage_fn};
