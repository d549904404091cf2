//! M4A (MPEG-4 audio) container parser.
//!
//! A recursive descent over nested ISO-BMFF "boxes" keyed by 4-byte type
//! code, dispatched through a closed match rather than a function-pointer
//! jump table — the set of box types is closed, so the compiler can check
//! exhaustiveness. Every box either consumes exactly its declared body, is
//! force-skipped with a warning, or aborts the parse — never silently
//! desyncs without recording a [`ParseStatus`] transition.
//!
//! The parser never panics on malformed input: short reads, truncated
//! boxes and unknown types all degrade to [`ParseStatus::ParsedWithWarnings`]
//! or a returned `Err`.

mod boxes;
mod sample_source;

pub use sample_source::SampleSource;

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LightPlayError, Result};

/// Frames per packet used by RAOP1's ALAC framing; also the divisor the
/// spec uses to convert a wall-clock seek offset into a sample index.
const FRAMES_PER_PACKET: u64 = 4096;

/// Audio encoding detected in the sample description table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// No recognized sample description has been seen yet.
    #[default]
    Unknown,
    /// Apple Lossless (`alac` sample entry).
    Alac,
    /// Advanced Audio Coding (`mp4a` sample entry).
    Aac,
}

/// Outcome of a parse. Warnings never fail the call that produced them —
/// only [`ParseStatus::Error`]-triggering conditions return `Err` from
/// [`M4AFile::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStatus {
    /// Every box was recognized and fully consumed.
    #[default]
    Ok,
    /// At least one box was unknown, malformed, or inconsistent, but
    /// parsing ran to completion.
    ParsedWithWarnings,
    /// Parsing could not continue (surfaced as `Err`, not stored on a
    /// live `M4AFile`).
    Error,
}

/// Kind of an iTunes metadata value, decoded from the `data` box's flags
/// field (low 5 bits): `0x00` binary, `0x01` UTF-8 text, `0x15` boolean,
/// `0x0D` image. Any other value is passed through uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// Raw binary payload (flags low 5 bits == 0x00).
    Binary,
    /// UTF-8 text payload (flags low 5 bits == 0x01).
    Utf8Text,
    /// Boolean payload, one byte (flags low 5 bits == 0x15).
    Boolean,
    /// Image payload, typically JPEG or PNG (flags low 5 bits == 0x0D).
    Image,
    /// Any other flags value, passed through verbatim.
    Other(u8),
}

impl MetadataKind {
    fn from_flags(flags: u32) -> Self {
        match flags & 0x1f {
            0x00 => MetadataKind::Binary,
            0x01 => MetadataKind::Utf8Text,
            0x15 => MetadataKind::Boolean,
            0x0d => MetadataKind::Image,
            other => MetadataKind::Other(other as u8),
        }
    }
}

/// Callback invoked once per iTunes metadata/annotation box encountered
/// under `moov/udta/meta/ilst`, with `(box_type, payload, kind)`. `box_type`
/// is the 4-character code interpreted as a big-endian `u32`, so standard
/// annotations compare directly against literal fourcc constants.
pub trait MetadataHandler: FnMut(u32, &[u8], MetadataKind) {}
impl<F: FnMut(u32, &[u8], MetadataKind)> MetadataHandler for F {}

/// Parsed descriptor for an opened M4A file.
///
/// Mutated only during [`M4AFile::open`]; read-only afterward except for
/// the two read cursors ([`M4AFile::set_sample_offset`],
/// [`M4AFile::next_sample`]), which are driven sequentially by a single
/// owner (the foreground thread before handing off to an
/// [`AudioPump`](crate::protocol::raop::AudioPump), which instead uses its
/// own independent [`SampleSource`] obtained from [`M4AFile::sample_source`]).
#[derive(Debug)]
pub struct M4AFile {
    path: PathBuf,
    data: File,
    sizes: File,

    data_offset: u64,
    size_offset: u64,
    total_size: u64,
    samples_count: u32,
    total_sample_size: u64,
    largest_sample_size: u32,
    timescale: u32,
    duration: u64,
    encoding: Encoding,
    status: ParseStatus,
}

impl M4AFile {
    /// Parse `path`, walking the box tree and populating a descriptor.
    ///
    /// `metadata_handler`, if given, is invoked once per iTunes annotation
    /// box (`----` and the standard 4-char tags) encountered under
    /// `ilst`. Passing it as a parameter rather than mutating global state
    /// keeps the parser reentrant.
    ///
    /// # Errors
    /// Returns [`LightPlayError::Io`] if the file cannot be opened or read,
    /// and [`LightPlayError::Parse`] if a box's structure is unrecoverably
    /// malformed.
    #[tracing::instrument(skip(metadata_handler), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, mut metadata_handler: Option<&mut dyn MetadataHandler>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let total_size = file.metadata()?.len();

        let mut ctx = boxes::ParseContext::default();
        boxes::parse_container(&mut file, total_size, &mut ctx, &mut metadata_handler)?;

        if ctx.status == ParseStatus::Error {
            return Err(LightPlayError::Parse(
                ctx.error
                    .unwrap_or_else(|| "malformed M4A file".to_string()),
            ));
        }

        let mut total_sample_size = ctx.total_sample_size;
        if let Some(mdat_len) = ctx.mdat_len {
            if mdat_len != total_sample_size {
                tracing::warn!(
                    stsz_total = total_sample_size,
                    mdat_len,
                    "sample-size sum disagrees with mdat length; keeping the smaller"
                );
                total_sample_size = total_sample_size.min(mdat_len);
                ctx.status = ParseStatus::ParsedWithWarnings;
            }
        }

        let data_offset = ctx.data_offset.ok_or_else(|| {
            LightPlayError::Parse("no mdat box found".to_string())
        })?;
        let size_offset = ctx.size_offset.ok_or_else(|| {
            LightPlayError::Parse("no stsz box found".to_string())
        })?;

        let data = File::open(path)?;
        let sizes = File::open(path)?;

        let mut this = Self {
            path: path.to_path_buf(),
            data,
            sizes,
            data_offset,
            size_offset,
            total_size,
            samples_count: ctx.samples_count,
            total_sample_size,
            largest_sample_size: ctx.largest_sample_size,
            timescale: ctx.timescale,
            duration: ctx.duration,
            encoding: ctx.encoding,
            status: ctx.status,
        };
        this.reset_cursors()?;
        Ok(this)
    }

    fn reset_cursors(&mut self) -> io::Result<()> {
        self.data.seek(SeekFrom::Start(self.data_offset))?;
        self.sizes.seek(SeekFrom::Start(self.size_offset))?;
        Ok(())
    }

    /// Detected sample encoding.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Samples per second.
    #[must_use]
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    /// Media length as `(seconds, nanoseconds)`.
    #[must_use]
    pub fn length(&self) -> (u64, u32) {
        if self.timescale == 0 {
            return (0, 0);
        }
        let seconds = self.duration / u64::from(self.timescale);
        let remainder = self.duration % u64::from(self.timescale);
        let nanos = (remainder * 1_000_000_000) / u64::from(self.timescale);
        (seconds, nanos as u32)
    }

    /// Total number of samples in the `stsz` table.
    #[must_use]
    pub fn samples_count(&self) -> u32 {
        self.samples_count
    }

    /// Largest single sample size, used to size the per-frame send buffer.
    #[must_use]
    pub fn largest_sample_size(&self) -> u32 {
        self.largest_sample_size
    }

    /// Size of the backing file.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Final parse outcome.
    #[must_use]
    pub fn status(&self) -> ParseStatus {
        self.status
    }

    /// Whether parsing completed with one or more absorbed warnings.
    #[must_use]
    pub fn has_parsed_with_warnings(&self) -> bool {
        self.status == ParseStatus::ParsedWithWarnings
    }

    /// Seek both cursors to the sample at wall-clock offset `time`.
    ///
    /// `sample_offset = timescale * time.seconds / FRAMES_PER_PACKET`
    /// (the 4096-frame RAOP packet size). Returns `false` without moving
    /// the cursors if that index is at or past [`M4AFile::samples_count`].
    ///
    /// # Errors
    /// Returns [`io::Error`] if a seek or read fails while walking the
    /// size table to the target index.
    pub fn set_sample_offset(&mut self, time: Duration) -> io::Result<bool> {
        let sample_offset = (u64::from(self.timescale) * time.as_secs()) / FRAMES_PER_PACKET;
        if sample_offset >= u64::from(self.samples_count) {
            return Ok(false);
        }

        self.sizes.seek(SeekFrom::Start(self.size_offset))?;
        self.data.seek(SeekFrom::Start(self.data_offset))?;

        for _ in 0..sample_offset {
            let size = self.sizes.read_u32::<BigEndian>()?;
            self.data.seek(SeekFrom::Current(i64::from(size)))?;
        }
        Ok(true)
    }

    /// Index of the sample the next [`M4AFile::next_sample`] call will
    /// return, derived from the size cursor's position.
    #[must_use]
    pub fn current_sample_index(&mut self) -> u32 {
        let pos = self.sizes.stream_position().unwrap_or(self.size_offset);
        ((pos.saturating_sub(self.size_offset)) / 4) as u32
    }

    /// Whether at least one more sample remains.
    #[must_use]
    pub fn has_more_samples(&mut self) -> bool {
        self.current_sample_index() < self.samples_count
    }

    /// Read the next sample into `buf`, returning its size.
    ///
    /// # Errors
    /// Returns [`io::Error`] if `buf` is shorter than
    /// [`M4AFile::largest_sample_size`] or a read fails.
    pub fn next_sample(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if (buf.len() as u64) < u64::from(self.largest_sample_size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "sample buffer shorter than the largest sample in this file",
            ));
        }
        let size = self.sizes.read_u32::<BigEndian>()?;
        self.data.read_exact(&mut buf[..size as usize])?;
        Ok(size as usize)
    }

    /// Build an independent, thread-movable sample cursor pair seeked to
    /// `start_time`, for a background consumer ([`AudioPump`](crate::protocol::raop::AudioPump))
    /// that must not contend with the foreground's own cursors.
    ///
    /// # Errors
    /// Returns [`io::Error`] if the backing file cannot be reopened or
    /// seeked.
    pub fn sample_source(&self, start_time: Duration) -> io::Result<SampleSource> {
        let sample_offset = (u64::from(self.timescale) * start_time.as_secs()) / FRAMES_PER_PACKET;
        SampleSource::open(
            &self.path,
            self.data_offset,
            self.size_offset,
            self.samples_count,
            self.largest_sample_size,
            sample_offset,
        )
    }
}

#[cfg(test)]
mod tests;
