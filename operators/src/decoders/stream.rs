use futures::StreamExt;
use futures::stream::BoxStream;
use geoingest_datatypes::primitives::Feature;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Level;

use super::{DecoderInput, DecoderKind};
use crate::config::PipelineConfig;
use crate::util::Result;

/// Runs a decoder on a blocking worker thread and exposes its features as a stream.
///
/// At most `row_buffer_size` decoded features wait for the consumer. The worker
/// blocks while the buffer is full and stops once the stream is dropped.
///
/// # Panics
/// * if called outside of a tokio runtime
///
pub fn decode_stream(
    kind: DecoderKind,
    input: DecoderInput,
    config: &PipelineConfig,
) -> BoxStream<'static, Result<Feature>> {
    let (sender, receiver) = mpsc::channel(config.row_buffer_size.max(1));
    let worker_config = config.clone();
    let worker_span = tracing::span!(Level::TRACE, "decoder_worker", %kind);

    // Decoders are not `Send`, so they are created inside the worker.
    let worker = tokio::task::spawn_blocking(move || {
        let _entered_span = worker_span.enter();

        let decoder = match kind.open(input, &worker_config) {
            Ok(decoder) => decoder,
            Err(error) => {
                let _ = sender.blocking_send(Err(error));
                return;
            }
        };

        for item in decoder {
            let failed = item.is_err();

            if sender.blocking_send(item).is_err() {
                tracing::debug!("Feature stream was dropped, stopping {kind} decoder");
                return;
            }

            if failed {
                return;
            }
        }
    });

    futures::stream::unfold(
        (receiver, Some(worker)),
        |(mut receiver, worker): (mpsc::Receiver<Result<Feature>>, Option<JoinHandle<()>>)| async move {
            if let Some(item) = receiver.recv().await {
                return Some((item, (receiver, worker)));
            }

            // the worker dropped its sender, so it is finished or has panicked
            match worker?.await {
                Ok(()) => None,
                Err(error) => Some((Err(error.into()), (receiver, None))),
            }
        },
    )
    .boxed()
}
