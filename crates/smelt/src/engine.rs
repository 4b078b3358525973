use crate::{BoxedStage, Flow, PipelineError, Stage};
use tracing::trace;

/// Drives `generator` until it signals end of stream, pushing every unit it
/// produces through `receivers`.
pub fn drive(
    generator: &mut dyn Stage,
    receivers: &mut [BoxedStage],
) -> Result<(), PipelineError> {
    loop {
        let unit = generator.advance(Flow::Eos)?;
        if unit.is_eos() {
            trace!(generator = generator.name(), "generator exhausted");
            return Ok(());
        }
        propagate(receivers, unit)?;
    }
}

/// Runs one generator unit through the receiver chain and returns what the
/// last pass produced.
///
/// A pass that ends on a receiver signalling end of stream is replayed with
/// the same file at EOF, but only when the unit itself was an EOF and some
/// receiver emitted bytes during that pass. Buffering receivers drain this
/// way. Mid-file units are never replayed since that would resend their
/// bytes.
pub(crate) fn propagate(receivers: &mut [BoxedStage], unit: Flow) -> Result<Flow, PipelineError> {
    let Some(file) = unit.file().cloned() else {
        return Ok(Flow::Eos);
    };
    let upstream_eof = unit.is_eof();
    let mut next_pass = unit;
    let mut repeats = 0usize;

    loop {
        let mut flow = next_pass;
        let mut streamed = false;

        for receiver in receivers.iter_mut() {
            flow = receiver.advance(flow)?;
            match &flow {
                Flow::Eos => break,
                Flow::Chunk(returned, _) | Flow::Eof(returned) => {
                    if !returned.same_file(&file) {
                        return Err(PipelineError::ReceiverBecameGenerator {
                            stage: receiver.name().to_string(),
                        });
                    }
                }
            }
            if flow.is_chunk() {
                streamed = true;
            }
        }

        if flow.is_eos() && streamed && upstream_eof {
            repeats += 1;
            trace!(file = %file.name(), repeats, "replaying EOF through receivers");
            next_pass = Flow::Eof(file.clone());
            continue;
        }
        return Ok(flow);
    }
}
