//! Receiving side of the transfer state machine

use std::io;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::link::Link;
use super::session::Halt;
use super::{
    decode, AbortSignal, Block, BlockSize, Channel, FileHeader, FrameError, ProgressReport,
    Protocol, Role, SessionState, Stage, Trailer, TransferError, TransferOptions,
    TransferOutcome, TransferSession, ACK, CAN, CRC_REQUEST, EOT, NAK,
};

/// Destination for received files
pub trait FileSink {
    /// Start a new file. `header` is `None` for XMODEM.
    fn open(&mut self, header: Option<&FileHeader>) -> io::Result<()>;

    /// Append data to the open file
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Finish the open file
    fn close(&mut self, file: &ReceivedFile) -> io::Result<()>;
}

/// A file that was received completely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// YMODEM header, if any
    pub header: Option<FileHeader>,
    /// Bytes written to the sink
    pub bytes: u64,
}

/// Collects received files in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Vec<(ReceivedFile, Vec<u8>)>,
    current: Option<Vec<u8>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed files with their contents, in arrival order
    pub fn files(&self) -> &[(ReceivedFile, Vec<u8>)] {
        &self.files
    }

    /// Contents of the first completed file
    pub fn first_data(&self) -> Option<&[u8]> {
        self.files.first().map(|(_, data)| data.as_slice())
    }
}

impl FileSink for MemorySink {
    fn open(&mut self, _header: Option<&FileHeader>) -> io::Result<()> {
        self.current = Some(Vec::new());
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no file open"))?
            .extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self, file: &ReceivedFile) -> io::Result<()> {
        let data = self
            .current
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no file open"))?;
        self.files.push((file.clone(), data));
        Ok(())
    }
}

/// What arrived on the line when a block was expected
enum Incoming {
    Block(Block),
    Eot,
    Corrupt(FrameError),
    Silence,
}

/// Drives one receive session over a borrowed channel
pub struct Receiver<'a, C: Channel + ?Sized> {
    link: Link<'a, C>,
    options: TransferOptions,
    session: TransferSession,
    abort: AbortSignal,
    progress: Option<&'a mut dyn FnMut(&ProgressReport)>,
    /// Byte sent to request blocks; may drop from 'C' to NAK
    handshake: u8,
    trailer: Trailer,
    streaming: bool,
}

impl<'a, C: Channel + ?Sized> Receiver<'a, C> {
    /// Create a receiver; the channel is borrowed for the session's lifetime
    pub fn new(channel: &'a mut C, options: TransferOptions, abort: AbortSignal) -> Self {
        let variant = options.variant;
        Self {
            link: Link::new(channel),
            options,
            session: TransferSession::new(Role::Receiver),
            abort,
            progress: None,
            handshake: variant.handshake(),
            trailer: variant.trailer(),
            streaming: variant.is_streaming(),
        }
    }

    /// Invoke `callback` after every accepted block
    pub fn with_progress(mut self, callback: &'a mut dyn FnMut(&ProgressReport)) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Session state, for inspection after `run`
    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Receive one XMODEM file or a YMODEM batch into `sink`
    pub fn run(&mut self, sink: &mut dyn FileSink) -> Result<TransferOutcome, TransferError> {
        self.options.validate()?;
        info!("Receiving with {}", self.options.label());

        match self.receive_all(sink) {
            Ok(()) => {
                self.session.transition(SessionState::Done);
                let summary = self.session.summary();
                info!(
                    "Receive complete: {} file(s), {} bytes, {} retries, {}ms",
                    summary.files.len(),
                    summary.bytes,
                    summary.retries,
                    summary.elapsed.as_millis()
                );
                Ok(TransferOutcome::Completed(summary))
            }
            Err(Halt::Aborted) => {
                self.session.transition(SessionState::Aborted);
                info!("Receive aborted locally, cancelling peer");
                if let Err(e) = self.link.send_cancel() {
                    warn!("Failed to send CAN after abort: {}", e);
                }
                Ok(TransferOutcome::Aborted)
            }
            Err(Halt::Failed(err)) => {
                self.session.transition(SessionState::Failed);
                error!("Receive failed: {}", err);
                if err.should_notify_peer() {
                    let _ = self.link.send_cancel();
                }
                Err(err)
            }
        }
    }

    fn receive_all(&mut self, sink: &mut dyn FileSink) -> Result<(), Halt> {
        match self.options.protocol {
            Protocol::Xmodem => {
                let first = match self.solicit_block(Stage::Handshake)? {
                    Some(block) => Incoming::Block(block),
                    None => {
                        info!("EOT before any block, receiving an empty file");
                        Incoming::Eot
                    }
                };
                self.receive_file(sink, None, Some(first))
            }
            Protocol::Ymodem => loop {
                let Some(block) = self.solicit_block(Stage::Header)? else {
                    continue;
                };
                if block.number() != 0 {
                    return Err(TransferError::OutOfSequence {
                        expected: 0,
                        received: block.number(),
                    }
                    .into());
                }

                match FileHeader::parse(block.payload())? {
                    None => {
                        debug!("End of batch");
                        self.link.send_control(ACK)?;
                        return Ok(());
                    }
                    Some(header) => {
                        info!("Incoming '{}' ({:?} bytes)", header.name, header.length);
                        if !self.streaming {
                            self.link.send_control(ACK)?;
                        }
                        self.link.send_control(self.handshake)?;
                        self.receive_file(sink, Some(header), None)?;
                    }
                }
            },
        }
    }

    fn check_abort(&self) -> Result<(), Halt> {
        if self.abort.is_requested() || self.link.abort_requested() {
            return Err(Halt::Aborted);
        }
        Ok(())
    }

    /// Read the next block, EOT or garbage off the line
    fn next_frame(&mut self, timeout: Duration) -> Result<Incoming, Halt> {
        let marker = match self.link.read_byte(timeout)? {
            None => return Ok(Incoming::Silence),
            Some(CAN) => return Err(TransferError::PeerCancelled.into()),
            Some(EOT) => return Ok(Incoming::Eot),
            Some(byte) if BlockSize::from_marker(byte).is_none() => {
                return Ok(Incoming::Corrupt(FrameError::InvalidMarker(byte)))
            }
            Some(byte) => byte,
        };

        let char_timeout = self.options.config.char_timeout();
        let mut frame = vec![marker];
        loop {
            match decode(&frame, self.trailer) {
                Ok(block) => return Ok(Incoming::Block(block)),
                Err(FrameError::Incomplete { needed }) => {
                    match self.link.read_exact(needed, char_timeout)? {
                        Some(rest) => frame.extend_from_slice(&rest),
                        None => return Ok(Incoming::Corrupt(FrameError::Incomplete { needed })),
                    }
                }
                Err(e) => return Ok(Incoming::Corrupt(e)),
            }
        }
    }

    /// Drain line noise, then reject with NAK
    fn reject(&mut self) -> Result<(), Halt> {
        self.link.purge(self.options.config.purge_timeout())?;
        self.link.send_control(NAK)?;
        Ok(())
    }

    fn retry_or_fail(&mut self, stage: Stage) -> Result<(), Halt> {
        if self.session.record_retry(self.options.config.max_retries) {
            Ok(())
        } else {
            Err(TransferError::Timeout {
                stage,
                attempts: self.session.retries,
            }
            .into())
        }
    }

    /// Send the handshake byte until the sender answers with a block.
    ///
    /// `None` means an XMODEM sender opened with EOT, so the file is empty.
    /// The EOT is left for `receive_file` to acknowledge.
    fn solicit_block(&mut self, stage: Stage) -> Result<Option<Block>, Halt> {
        self.session.transition(SessionState::AwaitHandshake);
        self.session.reset_retries();
        let timeout = self.options.config.handshake_timeout();
        let mut send_handshake = true;

        loop {
            self.check_abort()?;
            if send_handshake {
                self.link.send_control(self.handshake)?;
            }
            send_handshake = true;

            match self.next_frame(timeout)? {
                Incoming::Block(block) => {
                    self.session.reset_retries();
                    return Ok(Some(block));
                }
                Incoming::Eot if self.options.protocol == Protocol::Xmodem => {
                    self.session.reset_retries();
                    return Ok(None);
                }
                Incoming::Eot => {
                    // Our ACK of the previous file's EOT was lost
                    debug!("Repeated EOT while waiting for {}, acknowledging", stage);
                    self.link.send_control(ACK)?;
                }
                Incoming::Corrupt(e) => {
                    warn!("Bad block during {}: {}", stage, e);
                    self.reject()?;
                    send_handshake = false;
                }
                Incoming::Silence => {
                    debug!("No answer to handshake during {}", stage);
                    self.maybe_fall_back();
                }
            }
            self.retry_or_fail(stage)?;
        }
    }

    /// XMODEM receivers drop to checksum mode when 'C' goes unanswered
    fn maybe_fall_back(&mut self) {
        let attempts = self.options.config.crc_handshake_attempts;
        if self.options.protocol == Protocol::Xmodem
            && self.handshake == CRC_REQUEST
            && attempts > 0
            && self.session.retries + 1 >= attempts
        {
            warn!("Sender ignores CRC requests, falling back to checksum mode");
            self.handshake = NAK;
            self.trailer = Trailer::Checksum;
        }
    }

    fn receive_file(
        &mut self,
        sink: &mut dyn FileSink,
        header: Option<FileHeader>,
        mut first: Option<Incoming>,
    ) -> Result<(), Halt> {
        let length = header.as_ref().and_then(|h| h.length);
        self.session
            .begin_file(header.as_ref().map(|h| h.name.clone()), length);
        self.session.transition(SessionState::ExchangingBlocks);
        sink.open(header.as_ref()).map_err(TransferError::File)?;

        let timeout = self.options.config.response_timeout();
        let pad = self.options.pad_byte();
        let mut delivered: u64 = 0;
        // Without a declared length the newest block is held back so its
        // padding can be stripped once EOT shows it was the last one.
        let mut held: Option<Vec<u8>> = None;
        let mut eot_seen = false;

        loop {
            self.check_abort()?;
            let incoming = match first.take() {
                Some(incoming) => incoming,
                None => self.next_frame(timeout)?,
            };
            let expected = self.session.block_number;

            match incoming {
                Incoming::Block(block) if block.number() == expected => {
                    let payload = block.into_payload();
                    let useful = match length {
                        Some(len) => {
                            let take = (len.saturating_sub(delivered) as usize).min(payload.len());
                            sink.write(&payload[..take]).map_err(TransferError::File)?;
                            delivered += take as u64;
                            take
                        }
                        None => {
                            let size = payload.len();
                            if let Some(previous) = held.replace(payload) {
                                sink.write(&previous).map_err(TransferError::File)?;
                                delivered += previous.len() as u64;
                            }
                            size
                        }
                    };
                    if !self.streaming {
                        self.link.send_control(ACK)?;
                    }
                    self.session.complete_block(useful as u64);
                    self.report_progress();
                }
                Incoming::Block(block) if block.number() == expected.wrapping_sub(1) => {
                    if self.streaming {
                        return Err(TransferError::OutOfSequence {
                            expected,
                            received: block.number(),
                        }
                        .into());
                    }
                    warn!("Duplicate block {}, acknowledging without storing", block.number());
                    self.link.send_control(ACK)?;
                    // A repeated YMODEM header means our ACK and data handshake were lost
                    if block.number() == 0 && self.options.protocol == Protocol::Ymodem {
                        self.link.send_control(self.handshake)?;
                    }
                }
                Incoming::Block(block) => {
                    return Err(TransferError::OutOfSequence {
                        expected,
                        received: block.number(),
                    }
                    .into());
                }
                Incoming::Eot => {
                    self.session.transition(SessionState::AwaitEotAck);
                    if self.options.protocol == Protocol::Ymodem && !eot_seen {
                        // Confirm EOT wasn't line noise
                        eot_seen = true;
                        self.link.send_control(NAK)?;
                        continue;
                    }
                    self.link.send_control(ACK)?;
                    break;
                }
                Incoming::Corrupt(e) => {
                    if self.streaming {
                        return Err(TransferError::StreamCorrupted(e).into());
                    }
                    warn!("Bad block {}: {}", expected, e);
                    self.reject()?;
                    self.retry_or_fail(Stage::Block(expected))?;
                }
                Incoming::Silence => {
                    if self.streaming {
                        return Err(TransferError::Timeout {
                            stage: Stage::Block(expected),
                            attempts: 1,
                        }
                        .into());
                    }
                    // Until data flows the sender is still waiting for a handshake
                    let waiting_for_start = self.options.protocol == Protocol::Ymodem
                        && self.session.progress().blocks == 0;
                    if waiting_for_start {
                        warn!("No data yet, repeating handshake");
                        self.link.send_control(self.handshake)?;
                    } else {
                        warn!("Timed out waiting for block {}, sending NAK", expected);
                        self.link.send_control(NAK)?;
                    }
                    self.retry_or_fail(Stage::Block(expected))?;
                }
            }
        }

        if let Some(last) = held {
            let trimmed = strip_padding(&last, pad);
            sink.write(trimmed).map_err(TransferError::File)?;
            delivered += trimmed.len() as u64;
        }

        let received = ReceivedFile { header, bytes: delivered };
        sink.close(&received).map_err(TransferError::File)?;
        self.session.finish_file(delivered);
        debug!("File complete: {} bytes", delivered);
        Ok(())
    }

    fn report_progress(&mut self) {
        let report = self.session.progress();
        if let Some(callback) = self.progress.as_deref_mut() {
            callback(&report);
        }
    }
}

/// Drop the trailing run of `pad` bytes from the final block
fn strip_padding(block: &[u8], pad: u8) -> &[u8] {
    let end = block
        .iter()
        .rposition(|&b| b != pad)
        .map_or(0, |i| i + 1);
    &block[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SUB;

    #[test]
    fn test_strip_padding() {
        assert_eq!(strip_padding(&[1, 2, SUB, SUB], SUB), &[1, 2]);
        assert_eq!(strip_padding(&[1, 0, 2, 0, 0], 0), &[1, 0, 2]);
        assert_eq!(strip_padding(&[SUB; 4], SUB), &[] as &[u8]);
        assert_eq!(strip_padding(&[1, 2], SUB), &[1, 2]);
    }

    #[test]
    fn test_memory_sink_collects_files() {
        let mut sink = MemorySink::new();
        let header = FileHeader::new("a.txt");
        sink.open(Some(&header)).unwrap();
        sink.write(b"abc").unwrap();
        let file = ReceivedFile {
            header: Some(header),
            bytes: 3,
        };
        sink.close(&file).unwrap();
        assert_eq!(sink.files().len(), 1);
        assert_eq!(sink.first_data(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_memory_sink_rejects_write_without_open() {
        let mut sink = MemorySink::new();
        assert!(sink.write(b"x").is_err());
    }
}
