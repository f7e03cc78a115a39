use crate::domain::{SseDecoder, StreamMessage};
use crate::infra::client::RenderClient;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

pub type SubscriptionId = u64;

#[derive(Clone, Debug, PartialEq)]
pub enum StreamSignal {
    Message(StreamMessage),
    /// The subscription is over; `error` is `None` when the server closed the
    /// stream cleanly.
    Ended { error: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub subscription: SubscriptionId,
    pub signal: StreamSignal,
}

/// Decodes stream messages from a line-oriented reader.
pub struct EventStream<R> {
    reader: R,
    decoder: SseDecoder,
    line: Vec<u8>,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: SseDecoder::new(),
            line: Vec::new(),
        }
    }

    /// Reconnect delay last announced by the server, if any.
    pub fn retry(&self) -> Option<Duration> {
        self.decoder.retry()
    }

    /// Next message, or `None` at end of stream.
    pub fn next_message(&mut self) -> io::Result<Option<StreamMessage>> {
        loop {
            self.line.clear();
            let read = self.reader.read_until(b'\n', &mut self.line)?;
            if read == 0 {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(&self.line);
            if let Some(event) = self.decoder.push_line(&line) {
                return Ok(Some(StreamMessage::decode(&event.data)));
            }
        }
    }
}

/// Handle to a background stream reader.
///
/// Closing only flags the reader; a thread blocked on the socket exits after
/// the next line arrives or the connection drops, and anything it delivers in
/// between carries a retired id.
#[derive(Debug)]
pub struct StreamSubscription {
    id: SubscriptionId,
    cancelled: Arc<AtomicBool>,
}

impl StreamSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn close(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn subscribe(
    client: RenderClient,
    id: SubscriptionId,
    delay: Duration,
    tx: Sender<StreamEvent>,
) -> StreamSubscription {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();

    std::thread::spawn(move || {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if flag.load(Ordering::SeqCst) {
            return;
        }

        let send = |signal: StreamSignal| {
            tx.send(StreamEvent {
                subscription: id,
                signal,
            })
            .is_ok()
        };

        tracing::info!(subscription = id, server = %client.server(), "opening log stream");
        let reader = match client.open_stream() {
            Ok(reader) => reader,
            Err(error) => {
                tracing::warn!(subscription = id, %error, "log stream unavailable");
                let _ = send(StreamSignal::Ended {
                    error: Some(error.to_string()),
                });
                return;
            }
        };

        let mut stream = EventStream::new(reader);
        loop {
            if flag.load(Ordering::SeqCst) {
                tracing::debug!(subscription = id, "log stream closed locally");
                return;
            }
            match stream.next_message() {
                Ok(Some(message)) => {
                    if flag.load(Ordering::SeqCst) || !send(StreamSignal::Message(message)) {
                        return;
                    }
                }
                Ok(None) => {
                    tracing::info!(subscription = id, "log stream ended");
                    let _ = send(StreamSignal::Ended { error: None });
                    return;
                }
                Err(error) => {
                    tracing::warn!(subscription = id, %error, "log stream transport error");
                    let _ = send(StreamSignal::Ended {
                        error: Some(error.to_string()),
                    });
                    return;
                }
            }
        }
    });

    StreamSubscription { id, cancelled }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FrameEvent;
    use std::io::Cursor;

    #[test]
    fn event_stream_decodes_backend_framing() {
        let wire = concat!(
            "data: Blender 3.6 (hash abc)\n\n\n",
            "data: {\"frame\": 1, \"time\": \"00:08.89\"}\n\n",
            "data: {\"error\": \"Blender crashed. Reason: oom\"}\n\n",
        );
        let mut stream = EventStream::new(Cursor::new(wire.as_bytes().to_vec()));

        let mut messages = Vec::new();
        while let Some(message) = stream.next_message().expect("read") {
            messages.push(message);
        }

        assert_eq!(
            messages,
            vec![
                StreamMessage::Raw("Blender 3.6 (hash abc)".to_string()),
                StreamMessage::Frame(FrameEvent {
                    frame: 1,
                    time: "00:08.89".to_string(),
                }),
                StreamMessage::Error("Blender crashed. Reason: oom".to_string()),
            ]
        );
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut wire = b"data: caf".to_vec();
        wire.push(0xff);
        wire.extend_from_slice(b"\n\n");
        let mut stream = EventStream::new(Cursor::new(wire));
        let message = stream.next_message().expect("read").expect("message");
        assert_eq!(message, StreamMessage::Raw("caf\u{fffd}".to_string()));
        assert_eq!(stream.next_message().expect("eof"), None);
    }
}
