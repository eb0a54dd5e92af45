//! File transfer driver
//!
//! Opens local files and runs the protocol state machine over a channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modemlink_core::protocol::{AbortSignal, Protocol, TransferOptions, Variant};
//! use modemlink_core::{serial, transfer};
//!
//! let mut port = serial::open_port("/dev/ttyUSB0", Some(115200))?;
//! let options = TransferOptions::new(Protocol::Ymodem, Variant::OneK);
//! let outcome = transfer::send_file(
//!     &mut port,
//!     "firmware.bin".as_ref(),
//!     &options,
//!     None,
//!     &AbortSignal::new(),
//! )?;
//! assert!(outcome.is_completed());
//! ```

use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::protocol::{
    AbortSignal, Channel, FileHeader, FileSink, HeaderError, OutgoingFile, ProgressReport,
    Protocol, ReceivedFile, Receiver, Sender, TransferError, TransferOptions, TransferOutcome,
};

/// Send a single file
pub fn send_file<C: Channel + ?Sized>(
    channel: &mut C,
    path: &Path,
    options: &TransferOptions,
    progress: Option<&mut dyn FnMut(&ProgressReport)>,
    abort: &AbortSignal,
) -> Result<TransferOutcome, TransferError> {
    send_files(channel, &[path], options, progress, abort)
}

/// Send several files as one YMODEM batch (XMODEM accepts exactly one)
pub fn send_files<C: Channel + ?Sized, P: AsRef<Path>>(
    channel: &mut C,
    paths: &[P],
    options: &TransferOptions,
    progress: Option<&mut dyn FnMut(&ProgressReport)>,
    abort: &AbortSignal,
) -> Result<TransferOutcome, TransferError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let file = File::open(path).map_err(TransferError::File)?;
        let metadata = file.metadata().map_err(TransferError::File)?;
        let header = outgoing_header(path, &metadata)?;
        debug!("Queued {} ({} bytes)", path.display(), metadata.len());
        files.push(OutgoingFile::new(header, BufReader::new(file)));
    }

    let mut sender = Sender::new(channel, options.clone(), abort.clone());
    if let Some(callback) = progress {
        sender = sender.with_progress(callback);
    }
    sender.run(files)
}

/// Receive into `destination`.
///
/// XMODEM writes the single file to `destination`. YMODEM treats it as a
/// directory and names files after their headers.
pub fn receive_file<C: Channel + ?Sized>(
    channel: &mut C,
    destination: &Path,
    options: &TransferOptions,
    progress: Option<&mut dyn FnMut(&ProgressReport)>,
    abort: &AbortSignal,
) -> Result<TransferOutcome, TransferError> {
    let target = match options.protocol {
        Protocol::Xmodem => Target::File(destination.to_path_buf()),
        Protocol::Ymodem => {
            if !destination.is_dir() {
                return Err(TransferError::InvalidArgument(format!(
                    "YMODEM destination {} is not a directory",
                    destination.display()
                )));
            }
            Target::Directory(destination.to_path_buf())
        }
    };
    let mut sink = DiskSink::new(target);

    let mut receiver = Receiver::new(channel, options.clone(), abort.clone());
    if let Some(callback) = progress {
        receiver = receiver.with_progress(callback);
    }
    let outcome = receiver.run(&mut sink)?;

    for path in &sink.written {
        info!("Received {}", path.display());
    }
    Ok(outcome)
}

fn outgoing_header(path: &Path, metadata: &fs::Metadata) -> Result<FileHeader, TransferError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            TransferError::InvalidArgument(format!("{} has no usable file name", path.display()))
        })?;

    let mut header = FileHeader::new(name).with_length(metadata.len());
    if let Ok(modified) = metadata.modified() {
        header = header.with_modified(DateTime::<Utc>::from(modified));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        header = header.with_mode(metadata.permissions().mode());
    }
    Ok(header)
}

/// Reduce a name received from the peer to a single path component
fn sanitize_name(name: &str) -> Option<String> {
    let normalized = name.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

enum Target {
    File(PathBuf),
    Directory(PathBuf),
}

/// Writes received files to disk
struct DiskSink {
    target: Target,
    writer: Option<BufWriter<File>>,
    written: Vec<PathBuf>,
}

impl DiskSink {
    fn new(target: Target) -> Self {
        Self {
            target,
            writer: None,
            written: Vec::new(),
        }
    }

    fn path_for(&self, header: Option<&FileHeader>) -> io::Result<PathBuf> {
        match (&self.target, header) {
            (Target::File(path), _) => Ok(path.clone()),
            (Target::Directory(dir), Some(header)) => {
                let name = sanitize_name(&header.name).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        HeaderError::UnusableName(header.name.clone()),
                    )
                })?;
                Ok(dir.join(name))
            }
            (Target::Directory(_), None) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "directory target needs a file header",
            )),
        }
    }
}

impl FileSink for DiskSink {
    fn open(&mut self, header: Option<&FileHeader>) -> io::Result<()> {
        let path = self.path_for(header)?;
        debug!("Writing {}", path.display());
        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.written.push(path);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no file open"))?
            .write_all(data)
    }

    fn close(&mut self, file: &ReceivedFile) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!("Closed file after {} bytes", file.bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name_strips_directories() {
        assert_eq!(sanitize_name("a/b/c.txt"), Some("c.txt".to_string()));
        assert_eq!(sanitize_name("..\\evil.bin"), Some("evil.bin".to_string()));
        assert_eq!(sanitize_name("/etc/passwd"), Some("passwd".to_string()));
        assert_eq!(sanitize_name(".."), None);
    }

    #[test]
    fn test_outgoing_header_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, [7u8; 42]).unwrap();
        let metadata = fs::metadata(&path).unwrap();

        let header = outgoing_header(&path, &metadata).unwrap();
        assert_eq!(header.name, "data.bin");
        assert_eq!(header.length, Some(42));
        assert!(header.modified.is_some());
    }

    #[test]
    fn test_directory_sink_rejects_unusable_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DiskSink::new(Target::Directory(dir.path().to_path_buf()));
        let err = sink.open(Some(&FileHeader::new(".."))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
