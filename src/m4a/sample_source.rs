//! Owned, thread-movable sample cursor pair handed to the audio pump.

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::FRAMES_PER_PACKET;

/// A random-access view over an M4A's sample stream, independent of the
/// [`M4AFile`](super::M4AFile) it was created from.
///
/// Opens its own file descriptors so the background audio worker never
/// contends with the foreground's cursors for a single seek position.
#[derive(Debug)]
pub struct SampleSource {
    data: File,
    sizes: File,
    size_offset: u64,
    samples_count: u32,
    largest_sample_size: u32,
    current_index: u32,
}

impl SampleSource {
    pub(super) fn open(
        path: &Path,
        data_offset: u64,
        size_offset: u64,
        samples_count: u32,
        largest_sample_size: u32,
        sample_offset: u64,
    ) -> io::Result<Self> {
        let mut data = File::open(path)?;
        let mut sizes = File::open(path)?;
        let sample_offset = sample_offset.min(u64::from(samples_count));

        data.seek(SeekFrom::Start(data_offset))?;
        sizes.seek(SeekFrom::Start(size_offset))?;

        let mut this = Self {
            data,
            sizes,
            size_offset,
            samples_count,
            largest_sample_size,
            current_index: 0,
        };
        for _ in 0..sample_offset {
            this.skip_one()?;
        }
        Ok(this)
    }

    fn skip_one(&mut self) -> io::Result<()> {
        let size = self.sizes.read_u32::<BigEndian>()?;
        self.data.seek(SeekFrom::Current(i64::from(size)))?;
        self.current_index += 1;
        Ok(())
    }

    /// Whether at least one more sample remains.
    #[must_use]
    pub fn has_more_samples(&self) -> bool {
        self.current_index < self.samples_count
    }

    /// Current 0-based sample index.
    #[must_use]
    pub fn current_sample_index(&self) -> u32 {
        self.current_index
    }

    /// Read the next sample into `buf`, returning its size.
    ///
    /// # Errors
    /// Returns [`io::Error`] if `buf` is shorter than the file's largest
    /// sample or a read fails.
    pub fn next_sample(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if (buf.len() as u64) < u64::from(self.largest_sample_size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "sample buffer shorter than the largest sample in this file",
            ));
        }
        let size = self.sizes.read_u32::<BigEndian>()?;
        self.data.read_exact(&mut buf[..size as usize])?;
        self.current_index += 1;
        Ok(size as usize)
    }

    /// Largest sample size in this file; sizes the caller's frame buffer.
    #[must_use]
    pub fn largest_sample_size(&self) -> u32 {
        self.largest_sample_size
    }

    /// `FRAMES_PER_PACKET`, re-exported for callers that need to reason
    /// about seek granularity without importing the parent module.
    #[must_use]
    pub fn frames_per_packet() -> u64 {
        FRAMES_PER_PACKET
    }

    #[cfg(test)]
    pub(super) fn size_offset(&self) -> u64 {
        self.size_offset
    }
}
