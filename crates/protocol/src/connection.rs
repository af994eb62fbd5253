//! Connection engine: drives partial reads and writes of frames over a byte
//! stream.
//!
//! The engine owns the stream and its buffers. It does not know what the
//! messages mean; completed frames are handed to a [`Processor`] and outgoing
//! messages are pulled from it. The same engine works on a non-blocking socket
//! driven by readiness events (each call makes as much progress as the socket
//! allows and returns [`ReadProgress::Pending`] / [`WriteProgress::Pending`] on
//! `WouldBlock`) and on a blocking socket (calls simply block until done).

use std::io::{self, Read, Write};

use tracing::trace;

use crate::codec;
use crate::error::ProtocolError;
use crate::frame::{self, PREFIX_LEN};
use crate::message::Message;

/// Protocol-level handler bound to one connection.
pub trait Processor {
    /// Handles one complete incoming message.
    fn process(&mut self, message: Message) -> Result<(), ProtocolError>;

    /// Returns the next message to send, or `None` if there is nothing to send
    /// right now. Called only once the previous message has been fully written.
    fn next_outgoing(&mut self) -> Result<Option<Message>, ProtocolError>;
}

/// Result of one [`Connection::on_readable`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// A complete frame was decoded and handed to the processor.
    FrameProcessed,
    /// The stream has no more bytes right now; call again on the next
    /// readiness notification.
    Pending,
    /// The peer closed the stream cleanly between frames.
    Closed,
}

/// Result of one [`Connection::on_writable`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Everything was written and the processor has nothing more to send.
    Drained,
    /// The stream stopped accepting bytes; the rest stays buffered.
    Pending,
}

/// Frame-level state of one stream.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    max_frame_len: usize,
    prefix: [u8; PREFIX_LEN],
    prefix_filled: usize,
    /// Payload of the frame being read, sized once the prefix is known.
    payload: Option<Vec<u8>>,
    payload_filled: usize,
    outgoing: Vec<u8>,
    outgoing_pos: usize,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, max_frame_len: usize) -> Self {
        Self {
            stream,
            max_frame_len,
            prefix: [0; PREFIX_LEN],
            prefix_filled: 0,
            payload: None,
            payload_filled: 0,
            outgoing: Vec::new(),
            outgoing_pos: 0,
        }
    }

    /// Returns the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Returns the underlying stream mutably (e.g. for event registration).
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consumes the engine, returning the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Returns `true` if part of an outgoing frame is still buffered.
    pub fn has_pending_output(&self) -> bool {
        self.outgoing_pos < self.outgoing.len()
    }

    /// Reads available bytes, at most up to the end of the current frame.
    ///
    /// When a frame completes it is decoded and passed to
    /// [`Processor::process`], and the engine is reset for the next frame.
    /// Bytes belonging to the next frame are never consumed by this call.
    pub fn on_readable<P: Processor>(
        &mut self,
        processor: &mut P,
    ) -> Result<ReadProgress, ProtocolError> {
        loop {
            let Some(payload) = self.payload.as_mut() else {
                match read_some(&mut self.stream, &mut self.prefix[self.prefix_filled..])? {
                    Step::Read(n) => self.prefix_filled += n,
                    Step::WouldBlock => return Ok(ReadProgress::Pending),
                    Step::Eof if self.prefix_filled == 0 => return Ok(ReadProgress::Closed),
                    Step::Eof => return Err(ProtocolError::TruncatedFrame),
                }
                if self.prefix_filled == PREFIX_LEN {
                    let len = frame::parse_prefix(self.prefix, self.max_frame_len)?;
                    self.payload = Some(vec![0; len]);
                    self.payload_filled = 0;
                }
                continue;
            };

            if self.payload_filled < payload.len() {
                match read_some(&mut self.stream, &mut payload[self.payload_filled..])? {
                    Step::Read(n) => self.payload_filled += n,
                    Step::WouldBlock => return Ok(ReadProgress::Pending),
                    Step::Eof => return Err(ProtocolError::TruncatedFrame),
                }
                continue;
            }

            // Frame complete: reset before processing so a processor error
            // never leaves a half-consumed frame behind.
            let payload = self.payload.take().unwrap_or_default();
            self.prefix_filled = 0;
            self.payload_filled = 0;

            let message = codec::decode(&payload)?;
            trace!(kind = message.name(), len = payload.len(), "frame received");
            processor.process(message)?;
            return Ok(ReadProgress::FrameProcessed);
        }
    }

    /// Writes buffered output, pulling further messages from the processor
    /// whenever the buffer is drained.
    ///
    /// Bytes of two different messages are never interleaved: a new message
    /// is requested only after the previous frame was written completely.
    pub fn on_writable<P: Processor>(
        &mut self,
        processor: &mut P,
    ) -> Result<WriteProgress, ProtocolError> {
        loop {
            if !self.has_pending_output() {
                match processor.next_outgoing()? {
                    Some(message) => {
                        self.outgoing = frame::encode_frame(&message, self.max_frame_len)?;
                        self.outgoing_pos = 0;
                        trace!(kind = message.name(), len = self.outgoing.len(), "frame queued");
                    }
                    None => {
                        self.outgoing.clear();
                        self.outgoing_pos = 0;
                        return Ok(WriteProgress::Drained);
                    }
                }
            }

            match self.stream.write(&self.outgoing[self.outgoing_pos..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.outgoing_pos += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

enum Step {
    Read(usize),
    WouldBlock,
    Eof,
}

fn read_some<S: Read>(stream: &mut S, buf: &mut [u8]) -> io::Result<Step> {
    debug_assert!(!buf.is_empty());
    loop {
        match stream.read(buf) {
            Ok(0) => return Ok(Step::Eof),
            Ok(n) => return Ok(Step::Read(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::WouldBlock),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::MAX_FRAME_LEN;
    use crate::message::ErrorKind;

    /// In-memory stream that hands out input in small pieces, interleaved
    /// with `WouldBlock`, and accepts a bounded number of bytes per write.
    struct ChoppyStream {
        input: VecDeque<u8>,
        read_piece: usize,
        block_every_read: bool,
        blocked: bool,
        eof: bool,
        output: Vec<u8>,
        write_piece: usize,
        write_budget: usize,
    }

    impl ChoppyStream {
        fn new(input: Vec<u8>, read_piece: usize) -> Self {
            Self {
                input: input.into(),
                read_piece,
                block_every_read: true,
                blocked: false,
                eof: false,
                output: Vec::new(),
                write_piece: usize::MAX,
                write_budget: usize::MAX,
            }
        }
    }

    impl Read for ChoppyStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.input.is_empty() {
                if self.eof {
                    return Ok(0);
                }
                return Err(io::ErrorKind::WouldBlock.into());
            }
            if self.block_every_read {
                self.blocked = !self.blocked;
                if self.blocked {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
            }
            let n = buf.len().min(self.read_piece).min(self.input.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ChoppyStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.write_budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.write_piece).min(self.write_budget);
            self.write_budget -= n;
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        received: Vec<Message>,
        queue: VecDeque<Message>,
    }

    impl Processor for Recorder {
        fn process(&mut self, message: Message) -> Result<(), ProtocolError> {
            self.received.push(message);
            Ok(())
        }

        fn next_outgoing(&mut self) -> Result<Option<Message>, ProtocolError> {
            Ok(self.queue.pop_front())
        }
    }

    fn framed(messages: &[Message]) -> Vec<u8> {
        messages
            .iter()
            .flat_map(|m| frame::encode_frame(m, MAX_FRAME_LEN).unwrap())
            .collect()
    }

    /// Calls `on_readable` until the input is exhausted, collecting progress.
    fn drain_reads(conn: &mut Connection<ChoppyStream>, p: &mut Recorder) -> usize {
        let mut frames = 0;
        for _ in 0..10_000 {
            match conn.on_readable(p).unwrap() {
                ReadProgress::FrameProcessed => frames += 1,
                ReadProgress::Pending if conn.get_ref().input.is_empty() => break,
                ReadProgress::Pending => {}
                ReadProgress::Closed => break,
            }
        }
        frames
    }

    #[test]
    fn reassembles_frames_from_single_byte_reads() {
        let messages = vec![
            Message::ListRequest { path: ".".into() },
            Message::GetRequest {
                path: "a/b.txt".into(),
            },
        ];
        let mut conn = Connection::new(ChoppyStream::new(framed(&messages), 1), MAX_FRAME_LEN);
        let mut recorder = Recorder::default();

        assert_eq!(drain_reads(&mut conn, &mut recorder), 2);
        assert_eq!(recorder.received, messages);
    }

    #[test]
    fn stops_at_frame_boundary() {
        let messages = vec![
            Message::ListRequest { path: "x".into() },
            Message::ListRequest { path: "y".into() },
        ];
        let mut stream = ChoppyStream::new(framed(&messages), 4096);
        stream.block_every_read = false;
        let first_len = frame::encode_frame(&messages[0], MAX_FRAME_LEN)
            .unwrap()
            .len();
        let total = stream.input.len();
        let mut conn = Connection::new(stream, MAX_FRAME_LEN);
        let mut recorder = Recorder::default();

        assert_eq!(
            conn.on_readable(&mut recorder).unwrap(),
            ReadProgress::FrameProcessed
        );
        assert_eq!(recorder.received.len(), 1);
        assert_eq!(conn.get_ref().input.len(), total - first_len);
    }

    #[test]
    fn clean_eof_between_frames_is_closed() {
        let mut stream = ChoppyStream::new(Vec::new(), 16);
        stream.eof = true;
        let mut conn = Connection::new(stream, MAX_FRAME_LEN);
        assert_eq!(
            conn.on_readable(&mut Recorder::default()).unwrap(),
            ReadProgress::Closed
        );
    }

    #[test]
    fn eof_inside_frame_is_an_error() {
        let bytes = framed(&[Message::ListRequest {
            path: "docs".into(),
        }]);
        let mut stream = ChoppyStream::new(bytes[..bytes.len() - 2].to_vec(), 64);
        stream.block_every_read = false;
        stream.eof = true;
        let mut conn = Connection::new(stream, MAX_FRAME_LEN);

        let err = conn.on_readable(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedFrame));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let mut stream = ChoppyStream::new(1000u32.to_be_bytes().to_vec(), 64);
        stream.block_every_read = false;
        let mut conn = Connection::new(stream, 999);

        let err = conn.on_readable(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { len: 1000, .. }));
    }

    #[test]
    fn corrupt_payload_is_rejected() {
        let mut bytes = 3u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[crate::FORMAT_VERSION, 200, 0]);
        let mut stream = ChoppyStream::new(bytes, 64);
        stream.block_every_read = false;
        let mut conn = Connection::new(stream, MAX_FRAME_LEN);

        let err = conn.on_readable(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::Codec(_)));
    }

    #[test]
    fn partial_writes_resume_without_interleaving() {
        let messages = vec![
            Message::GetHeader {
                path: "f".into(),
                size: 3,
            },
            Message::GetData {
                bytes: vec![1, 2, 3],
            },
            Message::error(ErrorKind::NotFound, "nope"),
        ];
        let mut stream = ChoppyStream::new(Vec::new(), 1);
        stream.write_piece = 3;
        stream.write_budget = 5;
        let mut conn = Connection::new(stream, MAX_FRAME_LEN);
        let mut recorder = Recorder {
            queue: messages.clone().into(),
            ..Recorder::default()
        };

        assert_eq!(
            conn.on_writable(&mut recorder).unwrap(),
            WriteProgress::Pending
        );
        assert!(conn.has_pending_output());
        assert_eq!(conn.get_ref().output.len(), 5);

        conn.get_mut().write_budget = usize::MAX;
        assert_eq!(
            conn.on_writable(&mut recorder).unwrap(),
            WriteProgress::Drained
        );
        assert!(!conn.has_pending_output());
        assert_eq!(conn.get_ref().output, framed(&messages));
    }

    #[test]
    fn nothing_to_send_is_drained() {
        let mut conn = Connection::new(ChoppyStream::new(Vec::new(), 1), MAX_FRAME_LEN);
        assert_eq!(
            conn.on_writable(&mut Recorder::default()).unwrap(),
            WriteProgress::Drained
        );
        assert!(conn.get_ref().output.is_empty());
    }

    #[test]
    fn write_and_read_back_through_engine() {
        let message = Message::ListResponse {
            directories: vec!["sub".into()],
            files: vec!["file.txt".into()],
        };
        let mut writer = Connection::new(ChoppyStream::new(Vec::new(), 1), MAX_FRAME_LEN);
        let mut source = Recorder {
            queue: vec![message.clone()].into(),
            ..Recorder::default()
        };
        writer.on_writable(&mut source).unwrap();

        let bytes = writer.into_inner().output;
        let mut reader = Connection::new(ChoppyStream::new(bytes, 2), MAX_FRAME_LEN);
        let mut sink = Recorder::default();
        assert_eq!(drain_reads(&mut reader, &mut sink), 1);
        assert_eq!(sink.received, vec![message]);
    }
}
