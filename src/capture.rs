//! Capture flows: the frame source, the reference flow, the output flow and the
//! size sink.
//!
//! Reading uses `pcap-parser`'s legacy reader; writing emits the legacy PCAP
//! layout directly (global header, then one record per unit).

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::link_layer::LinkLayerType;
use crate::types::{FrameNumber, SessionId};

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const PCAP_SNAPLEN: u32 = 65535;
const READER_BUFFER_SIZE: usize = 65536;

/// Sequential pull of frames from a flow.
pub trait FrameSource {
    /// PCAP link type of every frame in the flow.
    fn link_type(&self) -> i32;

    /// Next frame, or `None` at end of flow.
    ///
    /// # Errors
    /// - [`CaptureError::Parse`] - The flow is corrupted
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

fn parse_error(path: &Path, reason: String) -> CaptureError {
    CaptureError::Parse {
        path: path.to_path_buf(),
        reason,
    }
}

/// Legacy PCAP reader.
pub struct PcapFrameSource<R: Read> {
    reader: LegacyPcapReader<R>,
    path: PathBuf,
    link_type: i32,
    exhausted: bool,
}

impl PcapFrameSource<BufReader<File>> {
    /// Opens a capture file and reads its global header.
    ///
    /// # Errors
    /// - [`CaptureError::Open`] - The file cannot be opened
    /// - [`CaptureError::Parse`] - The file is not a legacy PCAP capture
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), path)
    }
}

impl<R: Read> PcapFrameSource<R> {
    /// Wraps any reader holding a legacy PCAP stream. `label` names the flow in errors.
    ///
    /// # Errors
    /// - [`CaptureError::Parse`] - The stream has no legacy PCAP global header
    pub fn from_reader(input: R, label: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = label.as_ref().to_path_buf();
        let reader = LegacyPcapReader::new(READER_BUFFER_SIZE, input).map_err(|e| {
            CaptureError::Parse {
                path: path.clone(),
                reason: format!("{e:?}"),
            }
        })?;
        let mut source = Self {
            reader,
            path,
            link_type: 0,
            exhausted: false,
        };
        source.read_global_header()?;
        Ok(source)
    }

    fn read_global_header(&mut self) -> Result<(), CaptureError> {
        loop {
            match self.reader.next() {
                Ok((offset, PcapBlockOwned::LegacyHeader(header))) => {
                    self.link_type = header.network.0;
                    self.reader.consume(offset);
                    debug!(
                        path = %self.path.display(),
                        link_type = self.link_type,
                        "Opened capture"
                    );
                    return Ok(());
                }
                Ok(_) => {
                    let reason = "missing legacy PCAP global header".to_string();
                    return Err(parse_error(&self.path, reason));
                }
                Err(PcapError::Incomplete(_)) => {
                    if let Err(e) = self.reader.refill() {
                        let reason = format!("refill error: {e:?}");
                        return Err(parse_error(&self.path, reason));
                    }
                }
                Err(e) => {
                    let reason = format!("{e:?}");
                    return Err(parse_error(&self.path, reason));
                }
            }
        }
    }
}

impl<R: Read> FrameSource for PcapFrameSource<R> {
    fn link_type(&self) -> i32 {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::Legacy(packet) => Some(
                            Frame::with_lengths(
                                Bytes::copy_from_slice(packet.data),
                                packet.origlen,
                                packet.caplen,
                            )
                            .with_timestamp(packet.ts_sec, packet.ts_usec),
                        ),
                        PcapBlockOwned::LegacyHeader(_) => None,
                        PcapBlockOwned::NG(_) => {
                            warn!(
                                path = %self.path.display(),
                                "pcapng block ignored, only legacy pcap supported"
                            );
                            None
                        }
                    };
                    self.reader.consume(offset);
                    if frame.is_some() {
                        return Ok(frame);
                    }
                }
                Err(PcapError::Eof) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(PcapError::Incomplete(_)) => {
                    if let Err(e) = self.reader.refill() {
                        let reason = format!("refill error: {e:?}");
                        return Err(parse_error(&self.path, reason));
                    }
                }
                Err(e) => {
                    let reason = format!("{e:?}");
                    return Err(parse_error(&self.path, reason));
                }
            }
        }
    }
}

/// In-memory flow.
#[derive(Debug, Clone, Default)]
pub struct VecFrameSource {
    link_type: i32,
    frames: VecDeque<Frame>,
}

impl VecFrameSource {
    pub fn new(link_type: i32, frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            link_type,
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn link_type(&self) -> i32 {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        Ok(self.frames.pop_front())
    }
}

/// Output flow of compressed units, each prefixed with its frame's link-layer header.
pub struct PcapWriter<W: Write> {
    out: W,
    path: PathBuf,
    link: LinkLayerType,
    record: Vec<u8>,
}

impl PcapWriter<BufWriter<File>> {
    /// Creates the output file and writes the global header.
    ///
    /// # Errors
    /// - [`CaptureError::Open`] - The file cannot be created
    /// - [`CaptureError::Write`] - The global header cannot be written
    pub fn create(path: impl AsRef<Path>, link: LinkLayerType) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufWriter::new(file), path, link)
    }
}

impl<W: Write> PcapWriter<W> {
    /// Wraps `out` and writes the global header for `link`.
    ///
    /// # Errors
    /// - [`CaptureError::Write`] - The global header cannot be written
    pub fn new(out: W, label: impl AsRef<Path>, link: LinkLayerType) -> Result<Self, CaptureError> {
        let mut writer = Self {
            out,
            path: label.as_ref().to_path_buf(),
            link,
            record: Vec::new(),
        };
        writer.write_global_header()?;
        Ok(writer)
    }

    fn write_error(&self, source: std::io::Error) -> CaptureError {
        CaptureError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn write_global_header(&mut self) -> Result<(), CaptureError> {
        let mut header = Vec::with_capacity(24);
        header.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
        header.extend_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
        header.extend_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
        header.extend_from_slice(&0i32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&PCAP_SNAPLEN.to_le_bytes());
        header.extend_from_slice(&(self.link.linktype() as u32).to_le_bytes());
        self.out
            .write_all(&header)
            .map_err(|source| self.write_error(source))
    }

    /// Appends one record: the frame's link-layer header with the ROHC marker
    /// rewritten, followed by the compressed unit. The frame's timestamp is kept.
    ///
    /// # Errors
    /// - [`CaptureError::Write`] - The record cannot be written
    pub fn write_unit(&mut self, frame: &Frame, unit: &[u8]) -> Result<(), CaptureError> {
        self.record.clear();
        if let Some(header) = frame.link_header(self.link) {
            self.record.extend_from_slice(header);
            self.link.rewrite_header_marker(&mut self.record);
        }
        self.record.extend_from_slice(unit);

        let (ts_sec, ts_usec) = frame.timestamp();
        let len = self.record.len() as u32;
        let mut prefix = [0u8; 16];
        prefix[0..4].copy_from_slice(&ts_sec.to_le_bytes());
        prefix[4..8].copy_from_slice(&ts_usec.to_le_bytes());
        prefix[8..12].copy_from_slice(&len.to_le_bytes());
        prefix[12..16].copy_from_slice(&len.to_le_bytes());

        let result = self
            .out
            .write_all(&prefix)
            .and_then(|()| self.out.write_all(&self.record));
        result.map_err(|source| self.write_error(source))
    }

    /// # Errors
    /// - [`CaptureError::Write`] - Buffered records cannot be flushed
    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.out.flush().map_err(|source| self.write_error(source))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Text sink recording the size of every compressed unit.
pub struct SizeSink<W: Write> {
    out: W,
}

impl SizeSink<BufWriter<File>> {
    /// # Errors
    /// - [`CaptureError::Open`] - The file cannot be created
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SizeSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Appends `compressor_num = S\tpacket_num = N\trohc_size = Z`.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    pub fn record(
        &mut self,
        session: SessionId,
        frame: FrameNumber,
        size: usize,
    ) -> std::io::Result<()> {
        writeln!(
            self.out,
            "compressor_num = {}\tpacket_num = {}\trohc_size = {}",
            session.number(),
            frame.value(),
            size
        )
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
