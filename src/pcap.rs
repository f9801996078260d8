//! PCAP capture input and trace output.
//!
//! The pipeline itself only consumes an iterator of raw frames;
//! [`PcapFileReader`] adapts a legacy pcap file into that shape using the
//! `pcap_parser` crate. [`PcapWriter`] is the matching trace-write sink
//! and doubles as the engine's [`PacketDumper`].

use std::fs::File;
use std::io::Write;
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError as PcapParserError};

use crate::engine::PacketDumper;
use crate::error::{Error, PcapError};
use crate::packet::{LinkType, PacketBuffer, Timestamp};

/// Buffer size for the pcap_parser reader (64KB).
const BUFFER_SIZE: usize = 65_536;

/// One captured frame, owned, as delivered by a capture source.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub ts: Timestamp,
    pub link_type: LinkType,
    /// Length on the wire.
    pub len: u32,
    /// Captured length.
    pub cap_len: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// View this frame as a packet buffer borrowing the frame bytes.
    pub fn to_packet(&self) -> PacketBuffer<'_> {
        PacketBuffer::new(self.link_type, self.ts, self.cap_len, self.len, &self.data)
    }
}

/// Reader for legacy-format PCAP files.
pub struct PcapFileReader {
    inner: LegacyPcapReader<File>,
    link_type: LinkType,
    frames: u64,
}

impl std::fmt::Debug for PcapFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcapFileReader")
            .field("link_type", &self.link_type)
            .field("frames", &self.frames)
            .finish()
    }
}

impl PcapFileReader {
    /// Open a PCAP file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| {
            Error::Pcap(PcapError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;
        Self::new(file)
    }

    /// Wrap an already-open stream positioned at the global header.
    pub fn new(file: File) -> Result<Self, Error> {
        let inner = LegacyPcapReader::new(BUFFER_SIZE, file).map_err(|e| {
            Error::Pcap(PcapError::InvalidFormat {
                reason: format!("not a legacy pcap stream: {e}"),
            })
        })?;
        Ok(Self {
            inner,
            link_type: LinkType::Ethernet,
            frames: 0,
        })
    }

    /// Link type of the capture.
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Frames read so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Read the next frame. Returns `Ok(None)` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, Error> {
        loop {
            match self.inner.next() {
                Ok((offset, block)) => match block {
                    PcapBlockOwned::Legacy(packet) => {
                        self.frames += 1;
                        let frame = RawFrame {
                            ts: Timestamp::new(packet.ts_sec as i64, packet.ts_usec),
                            link_type: self.link_type,
                            len: packet.origlen,
                            cap_len: packet.caplen,
                            data: packet.data.to_vec(),
                        };
                        self.inner.consume(offset);
                        return Ok(Some(frame));
                    }
                    PcapBlockOwned::LegacyHeader(header) => {
                        self.link_type = LinkType::from_dlt(header.network.0 as u32);
                        self.inner.consume(offset);
                    }
                    _ => {
                        self.inner.consume(offset);
                    }
                },
                Err(PcapParserError::Eof) => return Ok(None),
                Err(PcapParserError::Incomplete) => {
                    self.inner.refill().map_err(|e| {
                        Error::Pcap(PcapError::InvalidFormat {
                            reason: format!("pcap refill error: {e}"),
                        })
                    })?;
                }
                Err(e) => {
                    return Err(Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("pcap parse error: {e}"),
                    }));
                }
            }
        }
    }
}

impl Iterator for PcapFileReader {
    type Item = Result<RawFrame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Legacy-format PCAP writer, usable as the engine's dump sink.
pub struct PcapWriter<W: Write> {
    writer: W,
}

impl<W: Write> PcapWriter<W> {
    /// Write the global header and return the writer.
    pub fn new(mut writer: W, link_type: LinkType) -> std::io::Result<Self> {
        writer.write_all(&0xa1b2c3d4u32.to_le_bytes())?; // magic
        writer.write_all(&2u16.to_le_bytes())?; // version major
        writer.write_all(&4u16.to_le_bytes())?; // version minor
        writer.write_all(&0i32.to_le_bytes())?; // thiszone
        writer.write_all(&0u32.to_le_bytes())?; // sigfigs
        writer.write_all(&65_535u32.to_le_bytes())?; // snaplen
        writer.write_all(&link_type.dlt().to_le_bytes())?; // network
        Ok(Self { writer })
    }

    /// Append one frame record.
    pub fn write_packet(&mut self, packet: &PacketBuffer<'_>) -> std::io::Result<()> {
        self.writer.write_all(&(packet.ts.sec as u32).to_le_bytes())?;
        self.writer.write_all(&packet.ts.usec.to_le_bytes())?;
        self.writer
            .write_all(&(packet.data().len() as u32).to_le_bytes())?;
        self.writer.write_all(&packet.len.to_le_bytes())?;
        self.writer.write_all(packet.data())?;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PacketDumper for PcapWriter<W> {
    fn dump_packet(&mut self, packet: &PacketBuffer<'_>) -> std::io::Result<()> {
        self.write_packet(packet)
    }
}
