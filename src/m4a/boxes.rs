//! Box dispatch table: the recursive descent over ISO-BMFF boxes.

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use super::{Encoding, MetadataHandler, MetadataKind, ParseStatus};
use crate::error::Result;

/// Four-character type codes, interpreted as a big-endian `u32` so they
/// compare directly against literal constants.
macro_rules! fourcc {
    ($s:expr) => {
        u32::from_be_bytes(*$s)
    };
}

const FTYP: u32 = fourcc!(b"ftyp");
const MOOV: u32 = fourcc!(b"moov");
const TRAK: u32 = fourcc!(b"trak");
const MDIA: u32 = fourcc!(b"mdia");
const MINF: u32 = fourcc!(b"minf");
const DINF: u32 = fourcc!(b"dinf");
const STBL: u32 = fourcc!(b"stbl");
const UDTA: u32 = fourcc!(b"udta");
const ILST: u32 = fourcc!(b"ilst");
const MVHD: u32 = fourcc!(b"mvhd");
const MDHD: u32 = fourcc!(b"mdhd");
const TKHD: u32 = fourcc!(b"tkhd");
const STSD: u32 = fourcc!(b"stsd");
const ALAC: u32 = fourcc!(b"alac");
const MP4A: u32 = fourcc!(b"mp4a");
const STTS: u32 = fourcc!(b"stts");
const STSZ: u32 = fourcc!(b"stsz");
const MDAT: u32 = fourcc!(b"mdat");
const META: u32 = fourcc!(b"meta");
const HDLR: u32 = fourcc!(b"hdlr");
const SMHD: u32 = fourcc!(b"smhd");
const DREF: u32 = fourcc!(b"dref");
const STSC: u32 = fourcc!(b"stsc");
const STCO: u32 = fourcc!(b"stco");
const FREE: u32 = fourcc!(b"free");
const FREEFORM: u32 = fourcc!(b"----");
const MEAN: u32 = fourcc!(b"mean");
const NAME: u32 = fourcc!(b"name");
const DATA: u32 = fourcc!(b"data");

/// Accumulates what the walk has learned so far; folded into an
/// [`M4AFile`](super::M4AFile) once parsing completes.
#[derive(Default)]
pub(super) struct ParseContext {
    pub data_offset: Option<u64>,
    pub size_offset: Option<u64>,
    pub samples_count: u32,
    pub total_sample_size: u64,
    pub mdat_len: Option<u64>,
    pub largest_sample_size: u32,
    pub timescale: u32,
    pub duration: u64,
    pub encoding: Encoding,
    pub status: ParseStatus,
    pub error: Option<String>,
}

impl ParseContext {
    fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::warn!("{msg}");
        if self.status == ParseStatus::Ok {
            self.status = ParseStatus::ParsedWithWarnings;
        }
    }
}

/// Walk every box in `[start, start + bytes_left)` of `file`'s current
/// position, dispatching each to its handler. Re-entered for every
/// container box (`moov`, `trak`, ... ) until `bytes_left == 0`.
pub(super) fn parse_container(
    file: &mut File,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    loop {
        let pos = file.stream_position()?;
        if pos >= end {
            break;
        }

        // Tolerate 1-3 superfluous trailing bytes at EOF: a short read of
        // the 8-byte header terminates the walk normally rather than
        // erroring.
        let mut header = [0u8; 8];
        match read_fully_or_eof(file, &mut header)? {
            8 => {}
            0 => break,
            _ => break,
        }
        let size = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let box_type = u32::from_be_bytes(header[4..8].try_into().unwrap());

        if size < 8 {
            ctx.warn(format!("box at {pos} declares size {size} < 8, aborting container"));
            break;
        }
        let body_start = pos + 8;
        let mut box_end = body_start + u64::from(size) - 8;
        if box_end > end {
            ctx.warn(format!(
                "box {box_type:08x} at {pos} overruns its container; clamping"
            ));
            box_end = end;
        }

        dispatch(file, box_type, body_start, box_end, ctx, metadata_handler)?;

        let after = file.stream_position()?;
        if after < box_end {
            ctx.warn(format!(
                "box {box_type:08x} at {pos} consumed {} of {} declared body bytes; skipping rest",
                after - body_start,
                box_end - body_start
            ));
            file.seek(SeekFrom::Start(box_end))?;
        } else if after > box_end {
            ctx.warn(format!(
                "box {box_type:08x} at {pos} overran its declared size"
            ));
        }
    }
    Ok(())
}

fn read_fully_or_eof(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

#[allow(clippy::too_many_lines)]
fn dispatch(
    file: &mut File,
    box_type: u32,
    start: u64,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    match box_type {
        FTYP => handle_ftyp(file, end, ctx),
        MOOV | TRAK | MDIA | MINF | DINF | STBL | UDTA => {
            parse_container(file, end, ctx, metadata_handler)
        }
        ILST => parse_ilst(file, end, ctx, metadata_handler),
        MVHD | MDHD => handle_media_header(file, box_type, end, ctx),
        TKHD => handle_tkhd(file, end, ctx),
        STSD => handle_stsd(file, end, ctx, metadata_handler),
        ALAC => {
            set_encoding(ctx, Encoding::Alac);
            Ok(())
        }
        MP4A => {
            set_encoding(ctx, Encoding::Aac);
            Ok(())
        }
        STTS => handle_stts(file, end, ctx),
        STSZ => handle_stsz(file, end, ctx),
        MDAT => handle_mdat(file, start, end, ctx),
        META => handle_meta(file, end, ctx, metadata_handler),
        HDLR | SMHD | DREF | STSC | STCO | FREE => Ok(()), // recognized, nothing to extract
        _ => {
            ctx.warn(format!("unknown box type {box_type:08x}"));
            Ok(())
        }
    }
}

fn set_encoding(ctx: &mut ParseContext, encoding: Encoding) {
    if ctx.encoding != Encoding::Unknown && ctx.encoding != encoding {
        ctx.warn(format!(
            "sample description conflict: already {:?}, now {encoding:?}",
            ctx.encoding
        ));
    }
    ctx.encoding = encoding;
}

fn handle_ftyp(file: &mut File, end: u64, ctx: &mut ParseContext) -> Result<()> {
    if end - file.stream_position()? < 8 {
        ctx.warn("ftyp box too short for major brand + minor version");
        return Ok(());
    }
    let mut major_brand = [0u8; 4];
    file.read_exact(&mut major_brand)?;
    let minor_version = file.read_u32::<BigEndian>()?;
    if &major_brand != b"M4A " {
        ctx.warn(format!(
            "unexpected major brand {:?}",
            String::from_utf8_lossy(&major_brand)
        ));
    }
    if minor_version != 0 {
        ctx.warn(format!("unexpected ftyp minor version {minor_version}"));
    }
    Ok(())
}

/// Read the 1-byte version + 3-byte flags preamble shared by every
/// "full box" (`mvhd`, `mdhd`, `stsd`, `stsz`, `meta`, `data`, ...).
fn read_full_box_preamble(file: &mut File) -> io::Result<(u8, u32)> {
    let version = file.read_u8()?;
    let mut flags_buf = [0u8; 3];
    file.read_exact(&mut flags_buf)?;
    let flags = u32::from_be_bytes([0, flags_buf[0], flags_buf[1], flags_buf[2]]);
    Ok((version, flags))
}

fn handle_media_header(file: &mut File, box_type: u32, end: u64, ctx: &mut ParseContext) -> Result<()> {
    let (version, _flags) = read_full_box_preamble(file)?;
    let (timescale, duration) = match version {
        0 => {
            let _creation = file.read_u32::<BigEndian>()?;
            let _modification = file.read_u32::<BigEndian>()?;
            let timescale = file.read_u32::<BigEndian>()?;
            let duration = u64::from(file.read_u32::<BigEndian>()?);
            (timescale, duration)
        }
        1 => {
            let _creation = file.read_u64::<BigEndian>()?;
            let _modification = file.read_u64::<BigEndian>()?;
            let timescale = file.read_u32::<BigEndian>()?;
            let raw_duration = file.read_u64::<BigEndian>()?;
            let upper = (raw_duration >> 32) as u32;
            if upper != 0 && upper != 0xFFFF_FFFF {
                return Err(crate::error::LightPlayError::Parse(format!(
                    "mdhd/mvhd version 1 duration has unsupported upper 32 bits {upper:08x}"
                )));
            }
            let duration = if upper == 0xFFFF_FFFF {
                // All-ones upper half is the "unknown duration" sentinel.
                0
            } else {
                raw_duration
            };
            (timescale, duration)
        }
        other => {
            ctx.warn(format!("unexpected media header version {other}"));
            return Ok(());
        }
    };

    if box_type == MDHD {
        ctx.timescale = timescale;
        // `stts`, parsed later in file order, supersedes this with the
        // exact sum of sample durations; this is the fallback if `stts`
        // is absent or comes up short.
        if ctx.duration == 0 {
            ctx.duration = duration;
        }
    }
    let _ = end;
    Ok(())
}

fn handle_tkhd(file: &mut File, end: u64, ctx: &mut ParseContext) -> Result<()> {
    let (version, _flags) = read_full_box_preamble(file)?;
    match version {
        0 => {
            let _creation = file.read_u32::<BigEndian>()?;
            let _modification = file.read_u32::<BigEndian>()?;
            let _track_id = file.read_u32::<BigEndian>()?;
            let _reserved = file.read_u32::<BigEndian>()?;
            let _duration = file.read_u32::<BigEndian>()?;
        }
        1 => {
            let _creation = file.read_u64::<BigEndian>()?;
            let _modification = file.read_u64::<BigEndian>()?;
            let _track_id = file.read_u32::<BigEndian>()?;
            let _reserved = file.read_u32::<BigEndian>()?;
            let _duration = file.read_u64::<BigEndian>()?;
        }
        other => ctx.warn(format!("unexpected tkhd version {other}")),
    }
    let _ = end;
    Ok(())
}

fn handle_stsd(
    file: &mut File,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    let (_version, _flags) = read_full_box_preamble(file)?;
    let _count = file.read_u32::<BigEndian>()?;
    parse_container(file, end, ctx, metadata_handler)
}

fn handle_stts(file: &mut File, end: u64, ctx: &mut ParseContext) -> Result<()> {
    let (_version, _flags) = read_full_box_preamble(file)?;
    let entry_count = file.read_u32::<BigEndian>()?;
    let mut total: u64 = 0;
    for _ in 0..entry_count {
        if end.saturating_sub(file.stream_position()?) < 8 {
            ctx.warn("stts table truncated before declared entry count");
            break;
        }
        let sample_count = u64::from(file.read_u32::<BigEndian>()?);
        let sample_delta = u64::from(file.read_u32::<BigEndian>()?);
        total += sample_count * sample_delta;
    }
    ctx.duration = total;
    Ok(())
}

fn handle_stsz(file: &mut File, end: u64, ctx: &mut ParseContext) -> Result<()> {
    let (_version, _flags) = read_full_box_preamble(file)?;
    let fixed_size = file.read_u32::<BigEndian>()?;
    if fixed_size != 0 {
        ctx.warn(format!(
            "stsz declares a fixed sample size {fixed_size}; only per-sample tables are supported"
        ));
    }
    let sample_count = file.read_u32::<BigEndian>()?;
    ctx.samples_count = sample_count;
    ctx.size_offset = Some(file.stream_position()?);

    let mut total: u64 = 0;
    let mut largest: u32 = 0;
    for _ in 0..sample_count {
        if end.saturating_sub(file.stream_position()?) < 4 {
            ctx.warn("stsz size table truncated before declared sample count");
            break;
        }
        let size = file.read_u32::<BigEndian>()?;
        total += u64::from(size);
        largest = largest.max(size);
    }
    ctx.total_sample_size = total;
    ctx.largest_sample_size = largest;
    Ok(())
}

fn handle_mdat(file: &mut File, start: u64, end: u64, ctx: &mut ParseContext) -> Result<()> {
    ctx.data_offset = Some(start);
    ctx.mdat_len = Some(end - start);
    file.seek(SeekFrom::Start(end))?;
    Ok(())
}

fn handle_meta(
    file: &mut File,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    let (_version, _flags) = read_full_box_preamble(file)?;
    parse_container(file, end, ctx, metadata_handler)
}

/// Each child of `ilst` wraps either a single `data` box (standard 4-char
/// annotations) or a `mean`/`name`/`data` triple (the `----` freeform
/// container). Every child is reported to `metadata_handler` in document
/// order if one is registered; otherwise the child is skipped untouched.
fn parse_ilst(
    file: &mut File,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    loop {
        let pos = file.stream_position()?;
        if pos >= end {
            break;
        }
        let mut header = [0u8; 8];
        if read_fully_or_eof(file, &mut header)? < 8 {
            break;
        }
        let size = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let box_type = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if size < 8 {
            ctx.warn("ilst child declares size < 8");
            break;
        }
        let body_start = pos + 8;
        let box_end = (body_start + u64::from(size) - 8).min(end);

        if box_type == FREEFORM {
            handle_freeform_annotation(file, box_end, ctx, metadata_handler)?;
        } else {
            handle_standard_annotation(file, box_type, box_end, ctx, metadata_handler)?;
        }

        let after = file.stream_position()?;
        if after < box_end {
            file.seek(SeekFrom::Start(box_end))?;
        }
    }
    Ok(())
}

fn handle_standard_annotation(
    file: &mut File,
    box_type: u32,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    let Some((payload, kind)) = read_sole_data_child(file, end, ctx)? else {
        file.seek(SeekFrom::Start(end))?;
        return Ok(());
    };
    if let Some(handler) = metadata_handler.as_mut() {
        handler(box_type, &payload, kind);
    }
    Ok(())
}

fn handle_freeform_annotation(
    file: &mut File,
    end: u64,
    ctx: &mut ParseContext,
    metadata_handler: &mut Option<&mut dyn MetadataHandler>,
) -> Result<()> {
    let mut mean: Option<Vec<u8>> = None;
    let mut name: Option<Vec<u8>> = None;
    let mut data: Option<(Vec<u8>, MetadataKind)> = None;

    loop {
        let pos = file.stream_position()?;
        if pos >= end {
            break;
        }
        let mut header = [0u8; 8];
        if read_fully_or_eof(file, &mut header)? < 8 {
            break;
        }
        let size = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let box_type = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if size < 8 {
            break;
        }
        let body_start = pos + 8;
        let body_end = (body_start + u64::from(size) - 8).min(end);
        let body_len = (body_end - body_start) as usize;

        match box_type {
            MEAN => mean = Some(read_exact_vec(file, body_len)?),
            NAME => name = Some(read_exact_vec(file, body_len)?),
            DATA => {
                let (version, flags) = read_full_box_preamble(file)?;
                let _ = version;
                let _reserved = file.read_u32::<BigEndian>()?;
                let value_len = body_len.saturating_sub(8);
                let value = read_exact_vec(file, value_len)?;
                data = Some((value, MetadataKind::from_flags(flags)));
            }
            _ => {}
        }
        file.seek(SeekFrom::Start(body_end))?;
    }

    if let (Some(handler), Some((payload, kind))) = (metadata_handler.as_mut(), data) {
        // `mean`/`name` identify the vendor/key for this freeform tag; the
        // spec's callback surface is `(box_type, payload, kind)` only, so
        // they are logged for diagnostics rather than threaded through.
        tracing::debug!(
            mean = mean.map(|m| String::from_utf8_lossy(&m).into_owned()),
            name = name.map(|n| String::from_utf8_lossy(&n).into_owned()),
            "freeform iTunes annotation"
        );
        handler(FREEFORM, &payload, kind);
    }
    let _ = ctx;
    Ok(())
}

fn read_sole_data_child(
    file: &mut File,
    end: u64,
    ctx: &mut ParseContext,
) -> Result<Option<(Vec<u8>, MetadataKind)>> {
    let pos = file.stream_position()?;
    if end.saturating_sub(pos) < 8 {
        return Ok(None);
    }
    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;
    let size = u32::from_be_bytes(header[0..4].try_into().unwrap());
    let box_type = u32::from_be_bytes(header[4..8].try_into().unwrap());
    if box_type != DATA || size < 8 {
        ctx.warn("standard iTunes annotation missing its data child");
        return Ok(None);
    }
    let body_start = pos + 8;
    let body_end = (body_start + u64::from(size) - 8).min(end);
    let body_len = (body_end - body_start) as usize;
    if body_len < 8 {
        return Ok(None);
    }
    let (_version, flags) = read_full_box_preamble(file)?;
    let _reserved = file.read_u32::<BigEndian>()?;
    let value = read_exact_vec(file, body_len - 8)?;
    Ok(Some((value, MetadataKind::from_flags(flags))))
}

fn read_exact_vec(file: &mut File, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
