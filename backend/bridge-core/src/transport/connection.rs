//! Per-connection plumbing shared by the listener and the dialer.

use crate::codec::{decode, encode_line};
use crate::error::codec::CodecError;
use crate::error::transport::TransportError;
use crate::transport::channel::{ChannelReader, ChannelWriter};

use common::ErrorLocation;
use models::Envelope;

use std::panic::Location;
use std::sync::Arc;

use log::{trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// One item of an endpoint's inbound sequence.
///
/// Malformed records are surfaced as `Err` so the consumer can decide how to
/// react. The read loop itself has already moved on to the next record.
pub type Inbound = Result<Envelope, CodecError>;

/// Serialized write half of a connection.
///
/// Each `send` encodes the whole record first and writes it under the lock,
/// so concurrent callers never interleave partial lines.
#[derive(Clone)]
pub(crate) struct ConnectionWriter {
    inner: Arc<Mutex<ChannelWriter>>,
}

impl ConnectionWriter {
    pub(crate) fn new(writer: ChannelWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub(crate) async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let line = encode_line(envelope).map_err(|e| TransportError::Send {
            message: format!("Failed to encode {} envelope: {e}", envelope.kind_name()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let mut writer = self.inner.lock().await;

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Send {
                message: format!("Failed to write {} envelope: {e}", envelope.kind_name()),
                location: ErrorLocation::from(Location::caller()),
            })?;

        writer.flush().await.map_err(|e| TransportError::Send {
            message: format!("Failed to flush {} envelope: {e}", envelope.kind_name()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        trace!("Sent {}", line.trim_end());
        Ok(())
    }

    /// Best-effort close of the write half.
    pub(crate) async fn close(&self) {
        let mut writer = self.inner.lock().await;
        if let Err(e) = writer.shutdown().await {
            trace!("Write half already closed: {e}");
        }
    }
}

/// Why a read loop ended.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// End of stream: the peer closed its side.
    PeerClosed,
    Failed(TransportError),
    Cancelled,
    /// The inbound receiver was dropped; nobody is listening for envelopes.
    ConsumerGone,
}

/// Read newline-delimited records until end of stream, failure, or cancellation.
///
/// Each item passes through `wrap` before it is queued.
pub(crate) async fn read_records<T>(
    reader: ChannelReader,
    inbound: &mpsc::Sender<T>,
    wrap: impl Fn(Inbound) -> T,
    cancel: &CancellationToken,
) -> ReadOutcome {
    let mut records = BufReader::new(reader).split(b'\n');

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            next = records.next_segment() => next,
        };

        let record = match next {
            Ok(Some(record)) => record,
            Ok(None) => return ReadOutcome::PeerClosed,
            Err(e) => {
                return ReadOutcome::Failed(TransportError::Read {
                    message: format!("Failed to read record: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        let item = match std::str::from_utf8(&record) {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => decode(text),
            Err(e) => Err(CodecError::malformed(format!("record is not UTF-8: {e}"))),
        };

        match &item {
            Ok(envelope) => trace!("Received {}", envelope.kind_name()),
            Err(e) => warn!("Skipping malformed record: {e}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            sent = inbound.send(wrap(item)) => {
                if sent.is_err() {
                    return ReadOutcome::ConsumerGone;
                }
            }
        }
    }
}
