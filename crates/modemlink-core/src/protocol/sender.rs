//! Sending side of the transfer state machine

use std::io::{self, Read};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use super::link::Link;
use super::session::Halt;
use super::{
    encode, AbortSignal, Block, BlockSize, Channel, FileHeader, ProgressReport, Protocol, Role,
    SessionState, Stage, Trailer, TransferError, TransferOptions, TransferOutcome,
    TransferSession, ACK, CAN, CRC_REQUEST, EOT, NAK, STREAM_REQUEST,
};

/// A file queued for sending
pub struct OutgoingFile<'f> {
    /// Metadata; only the name is used by XMODEM, for logging
    pub header: FileHeader,
    /// File contents
    pub reader: Box<dyn Read + 'f>,
}

impl<'f> OutgoingFile<'f> {
    /// Queue `reader` under `header`
    pub fn new(header: FileHeader, reader: impl Read + 'f) -> Self {
        Self {
            header,
            reader: Box::new(reader),
        }
    }

    /// Queue an in-memory buffer, declaring its exact length
    pub fn from_bytes(name: impl Into<String>, data: &'f [u8]) -> Self {
        Self::new(FileHeader::new(name).with_length(data.len() as u64), data)
    }
}

/// Drives one send session over a borrowed channel
pub struct Sender<'a, C: Channel + ?Sized> {
    link: Link<'a, C>,
    options: TransferOptions,
    session: TransferSession,
    abort: AbortSignal,
    progress: Option<&'a mut dyn FnMut(&ProgressReport)>,
    /// Block check negotiated with the receiver
    trailer: Trailer,
    /// Receiver asked for 'G' streaming
    streaming: bool,
}

impl<'a, C: Channel + ?Sized> Sender<'a, C> {
    /// Create a sender; the channel is borrowed for the session's lifetime
    pub fn new(channel: &'a mut C, options: TransferOptions, abort: AbortSignal) -> Self {
        let trailer = options.variant.trailer();
        let streaming = options.variant.is_streaming();
        Self {
            link: Link::new(channel),
            options,
            session: TransferSession::new(Role::Sender),
            abort,
            progress: None,
            trailer,
            streaming,
        }
    }

    /// Invoke `callback` after every acknowledged block
    pub fn with_progress(mut self, callback: &'a mut dyn FnMut(&ProgressReport)) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Session state, for inspection after `run`
    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Send `files`.
    ///
    /// XMODEM takes exactly one file; YMODEM sends them as one batch.
    pub fn run(&mut self, files: Vec<OutgoingFile<'_>>) -> Result<TransferOutcome, TransferError> {
        self.options.validate()?;
        if self.options.protocol == Protocol::Xmodem && files.len() != 1 {
            return Err(TransferError::InvalidArgument(format!(
                "XMODEM sends exactly one file, got {}",
                files.len()
            )));
        }

        info!(
            "Sending {} file(s) with {}",
            files.len(),
            self.options.label()
        );

        match self.send_all(files) {
            Ok(()) => {
                self.session.transition(SessionState::Done);
                let summary = self.session.summary();
                info!(
                    "Send complete: {} bytes in {} blocks, {} retries, {}ms",
                    summary.bytes,
                    summary.blocks,
                    summary.retries,
                    summary.elapsed.as_millis()
                );
                Ok(TransferOutcome::Completed(summary))
            }
            Err(Halt::Aborted) => {
                self.session.transition(SessionState::Aborted);
                info!("Send aborted locally, cancelling peer");
                if let Err(e) = self.link.send_cancel() {
                    warn!("Failed to send CAN after abort: {}", e);
                }
                Ok(TransferOutcome::Aborted)
            }
            Err(Halt::Failed(err)) => {
                self.session.transition(SessionState::Failed);
                error!("Send failed: {}", err);
                if err.should_notify_peer() {
                    let _ = self.link.send_cancel();
                }
                Err(err)
            }
        }
    }

    fn send_all(&mut self, files: Vec<OutgoingFile<'_>>) -> Result<(), Halt> {
        match self.options.protocol {
            Protocol::Xmodem => {
                for file in files {
                    self.await_handshake(Stage::Handshake)?;
                    self.send_data(file)?;
                    self.send_eot()?;
                }
            }
            Protocol::Ymodem => {
                for file in files {
                    self.await_handshake(Stage::Handshake)?;
                    self.send_header(&file.header)?;
                    self.send_data(file)?;
                    self.send_eot()?;
                }
                self.await_handshake(Stage::EndOfBatch)?;
                self.send_end_of_batch()?;
            }
        }
        Ok(())
    }

    fn check_abort(&self) -> Result<(), Halt> {
        if self.abort.is_requested() || self.link.abort_requested() {
            return Err(Halt::Aborted);
        }
        Ok(())
    }

    /// Read bytes until one satisfying `accept` arrives or `timeout` passes.
    /// Anything else is line noise, except CAN.
    fn wait_for(
        &mut self,
        timeout: Duration,
        accept: impl Fn(u8) -> bool,
    ) -> Result<Option<u8>, Halt> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.link.read_byte(remaining)? {
                Some(CAN) => return Err(TransferError::PeerCancelled.into()),
                Some(byte) if accept(byte) => return Ok(Some(byte)),
                Some(byte) => trace!("ignoring {:#04x} from receiver", byte),
                None => return Ok(None),
            }
        }
    }

    /// Wait for NAK / 'C' / 'G' and adopt the mode it requests
    fn await_handshake(&mut self, stage: Stage) -> Result<(), Halt> {
        self.session.transition(SessionState::AwaitHandshake);
        let timeout = self.options.config.handshake_timeout();
        let max_retries = self.options.config.max_retries;
        self.session.reset_retries();

        loop {
            self.check_abort()?;
            let accept = |b: u8| b == NAK || b == CRC_REQUEST || b == STREAM_REQUEST;
            match self.wait_for(timeout, accept)? {
                Some(byte) => {
                    self.negotiate(byte);
                    self.session.reset_retries();
                    return Ok(());
                }
                None => {
                    warn!("No handshake from receiver during {}", stage);
                    if !self.session.record_retry(max_retries) {
                        return Err(TransferError::Timeout {
                            stage,
                            attempts: self.session.retries,
                        }
                        .into());
                    }
                }
            }
        }
    }

    fn negotiate(&mut self, handshake: u8) {
        let (trailer, streaming) = match handshake {
            NAK => (Trailer::Checksum, false),
            STREAM_REQUEST => (Trailer::Crc16, true),
            _ => (Trailer::Crc16, false),
        };
        if trailer != self.options.variant.trailer() {
            warn!(
                "Receiver requested {:?} block check, falling back from {:?}",
                trailer,
                self.options.variant.trailer()
            );
        }
        if streaming != self.options.variant.is_streaming() {
            debug!("Receiver requested streaming={}", streaming);
        }
        self.trailer = trailer;
        self.streaming = streaming;
    }

    /// Send `frame` until it is ACKed
    fn send_with_ack(&mut self, stage: Stage, frame: &[u8]) -> Result<(), Halt> {
        let timeout = self.options.config.response_timeout();
        let max_retries = self.options.config.max_retries;
        self.session.reset_retries();

        loop {
            self.check_abort()?;
            self.link.write_all(frame)?;
            match self.wait_for(timeout, |b| b == ACK || b == NAK)? {
                Some(ACK) => {
                    self.session.reset_retries();
                    return Ok(());
                }
                Some(_) => warn!("NAK for {}, resending", stage),
                None => warn!("No response for {}, resending", stage),
            }
            if !self.session.record_retry(max_retries) {
                return Err(TransferError::Timeout {
                    stage,
                    attempts: self.session.retries,
                }
                .into());
            }
        }
    }

    fn send_header(&mut self, header: &FileHeader) -> Result<(), Halt> {
        self.session.transition(SessionState::ExchangingBlocks);
        debug!("Sending header for '{}' ({:?} bytes)", header.name, header.length);
        let frame = encode(&header.to_block(), self.trailer);

        if self.streaming {
            // YMODEM-G: the receiver answers the header with another 'G'
            self.check_abort()?;
            self.link.write_all(&frame)?;
        } else {
            self.send_with_ack(Stage::Header, &frame)?;
        }
        self.await_handshake(Stage::Header)
    }

    fn send_data(&mut self, mut file: OutgoingFile<'_>) -> Result<(), Halt> {
        self.session.transition(SessionState::ExchangingBlocks);
        self.session
            .begin_file(Some(file.header.name.clone()), file.header.length);
        info!("Sending '{}'", file.header.name);

        let full_size = self.options.variant.block_size();
        let pad = self.options.pad_byte();
        let mut buf = vec![0u8; full_size.len()];
        let mut sent: u64 = 0;

        loop {
            self.check_abort()?;
            let n = read_chunk(&mut file.reader, &mut buf).map_err(TransferError::File)?;
            if n == 0 {
                break;
            }

            // A short final chunk that fits a 128-byte block is sent as one
            let size = if n <= BlockSize::Standard.len() {
                BlockSize::Standard
            } else {
                full_size
            };
            let number = self.session.block_number;
            let frame = encode(&Block::padded(number, &buf[..n], size, pad), self.trailer);

            if self.streaming {
                self.link.write_all(&frame)?;
                self.poll_for_cancel()?;
            } else {
                self.send_with_ack(Stage::Block(number), &frame)?;
            }
            trace!("block {} sent ({} bytes)", number, n);

            sent += n as u64;
            self.session.complete_block(n as u64);
            self.report_progress();
        }

        self.session.finish_file(sent);
        Ok(())
    }

    /// In streaming mode the only thing the receiver may say mid-file is CAN
    fn poll_for_cancel(&mut self) -> Result<(), Halt> {
        while let Some(byte) = self.link.poll_byte()? {
            if byte == CAN {
                return Err(TransferError::PeerCancelled.into());
            }
            trace!("ignoring {:#04x} during streaming", byte);
        }
        Ok(())
    }

    fn send_eot(&mut self) -> Result<(), Halt> {
        self.session.transition(SessionState::AwaitEotAck);
        let timeout = self.options.config.response_timeout();
        let max_retries = self.options.config.max_retries;
        self.session.reset_retries();
        let mut naks = 0u32;

        loop {
            self.check_abort()?;
            self.link.send_control(EOT)?;
            match self.wait_for(timeout, |b| b == ACK || b == NAK)? {
                Some(ACK) => {
                    debug!("EOT acknowledged");
                    self.session.reset_retries();
                    return Ok(());
                }
                Some(_) => {
                    naks += 1;
                    // YMODEM receivers NAK the first EOT by design
                    if naks == 1 {
                        debug!("EOT NAKed, resending");
                        continue;
                    }
                    warn!("EOT NAKed again, resending");
                }
                None => warn!("No response to EOT, resending"),
            }
            if !self.session.record_retry(max_retries) {
                return Err(TransferError::Timeout {
                    stage: Stage::EndOfFile,
                    attempts: self.session.retries,
                }
                .into());
            }
        }
    }

    fn send_end_of_batch(&mut self) -> Result<(), Halt> {
        self.session.transition(SessionState::ExchangingBlocks);
        debug!("Sending end-of-batch header");
        let frame = encode(&FileHeader::end_of_batch(), self.trailer);
        self.send_with_ack(Stage::EndOfBatch, &frame)
    }

    fn report_progress(&mut self) {
        let report = self.session.progress();
        if let Some(callback) = self.progress.as_deref_mut() {
            callback(&report);
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input
fn read_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Trickle<'a> {
        data: &'a [u8],
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // Hand out at most 3 bytes per call
            let n = self.data.len().min(buf.len()).min(3);
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_chunk_fills_across_short_reads() {
        let data: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let mut reader = Trickle { data: &data };
        let mut buf = [0u8; 128];
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 128);
        assert_eq!(&buf[..], &data[..128]);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 72);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }
}
