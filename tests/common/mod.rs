//! Shared fixtures for the end-to-end integration tests: a hand-built ALAC
//! M4A file and a scripted fake RAOP receiver (control + audio listeners)
//! standing in for a real AirTunes device.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};

fn box_header(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(body);
    out
}

/// Builds a minimal well-formed ALAC M4A with `sample_count` samples of
/// `sample_size` bytes each, every sample filled with its own 0-based
/// index (mod 256) so a test can identify which sample a frame carries.
pub fn build_alac_fixture(sample_count: u32, sample_size: u32) -> Vec<u8> {
    let timescale: u32 = 44100;
    let frames_per_packet = 4096u32;

    let mut ftyp_body = Vec::new();
    ftyp_body.extend_from_slice(b"M4A ");
    ftyp_body.extend_from_slice(&0u32.to_be_bytes());
    let ftyp = box_header(b"ftyp", &ftyp_body);

    let mut mvhd_body = vec![0u8; 4];
    mvhd_body.extend_from_slice(&0u32.to_be_bytes());
    mvhd_body.extend_from_slice(&0u32.to_be_bytes());
    mvhd_body.extend_from_slice(&timescale.to_be_bytes());
    mvhd_body.extend_from_slice(&(sample_count * frames_per_packet).to_be_bytes());
    let mvhd = box_header(b"mvhd", &mvhd_body);

    let mut mdhd_body = vec![0u8; 4];
    mdhd_body.extend_from_slice(&0u32.to_be_bytes());
    mdhd_body.extend_from_slice(&0u32.to_be_bytes());
    mdhd_body.extend_from_slice(&timescale.to_be_bytes());
    mdhd_body.extend_from_slice(&(sample_count * frames_per_packet).to_be_bytes());
    let mdhd = box_header(b"mdhd", &mdhd_body);

    let mut alac_body = vec![0u8; 6];
    alac_body.extend_from_slice(&1u16.to_be_bytes());
    let alac = box_header(b"alac", &alac_body);

    let mut stsd_body = vec![0u8; 4];
    stsd_body.extend_from_slice(&1u32.to_be_bytes());
    stsd_body.extend_from_slice(&alac);
    let stsd = box_header(b"stsd", &stsd_body);

    let mut stts_body = vec![0u8; 4];
    stts_body.extend_from_slice(&1u32.to_be_bytes());
    stts_body.extend_from_slice(&sample_count.to_be_bytes());
    stts_body.extend_from_slice(&frames_per_packet.to_be_bytes());
    let stts = box_header(b"stts", &stts_body);

    let mut stsz_body = vec![0u8; 4];
    stsz_body.extend_from_slice(&0u32.to_be_bytes());
    stsz_body.extend_from_slice(&sample_count.to_be_bytes());
    for _ in 0..sample_count {
        stsz_body.extend_from_slice(&sample_size.to_be_bytes());
    }
    let stsz = box_header(b"stsz", &stsz_body);

    let mut stbl_body = Vec::new();
    stbl_body.extend_from_slice(&stsd);
    stbl_body.extend_from_slice(&stts);
    stbl_body.extend_from_slice(&stsz);
    let stbl = box_header(b"stbl", &stbl_body);

    let minf = box_header(b"minf", &stbl);
    let mut mdia_body = Vec::new();
    mdia_body.extend_from_slice(&mdhd);
    mdia_body.extend_from_slice(&minf);
    let mdia = box_header(b"mdia", &mdia_body);
    let trak = box_header(b"trak", &mdia);

    let mut moov_body = Vec::new();
    moov_body.extend_from_slice(&mvhd);
    moov_body.extend_from_slice(&trak);
    let moov = box_header(b"moov", &moov_body);

    let mut mdat_body = Vec::with_capacity((sample_count * sample_size) as usize);
    for index in 0..sample_count {
        mdat_body.extend(std::iter::repeat((index % 256) as u8).take(sample_size as usize));
    }
    let mdat = box_header(b"mdat", &mdat_body);

    let mut file = Vec::new();
    file.extend_from_slice(&ftyp);
    file.extend_from_slice(&moov);
    file.extend_from_slice(&mdat);
    file
}

pub fn write_fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

/// An RTSP request as observed by the fake receiver.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn cseq(&self) -> &str {
        self.headers.get("cseq").map(String::as_str).unwrap_or("")
    }
}

/// Reads one RTSP request off `reader`, or `None` on an orderly close.
pub fn read_request(reader: &mut BufReader<TcpStream>) -> Option<ParsedRequest> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).ok()? == 0 {
        return None;
    }
    let mut parts = request_line.trim_end().splitn(3, ' ');
    let method = parts.next()?.to_string();
    let uri = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed.split_once(':')?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).ok()?;
    }

    Some(ParsedRequest {
        method,
        uri,
        headers,
        body,
    })
}

/// Builds a raw RTSP response wire image.
pub fn build_response(
    status: u16,
    reason: &str,
    cseq: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> Vec<u8> {
    let mut out = format!("RTSP/1.0 {status} {reason}\r\nCSeq: {cseq}\r\n");
    for (name, value) in extra_headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    if !body.is_empty() {
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Spawns the fake receiver's control-connection thread: accepts one
/// connection on `listener`, then repeatedly reads a request and hands it
/// to `handler`, writing back whatever wire image `handler` returns. Stops
/// after a `TEARDOWN` request or an orderly close. Returns every request
/// observed, in order.
pub fn spawn_control_receiver<F>(
    listener: TcpListener,
    mut handler: F,
) -> std::thread::JoinHandle<Vec<ParsedRequest>>
where
    F: FnMut(&ParsedRequest) -> Vec<u8> + Send + 'static,
{
    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut seen = Vec::new();
        while let Some(request) = read_request(&mut reader) {
            let response = handler(&request);
            writer.write_all(&response).unwrap();
            let is_teardown = request.method == "TEARDOWN";
            seen.push(request);
            if is_teardown {
                break;
            }
        }
        seen
    })
}

/// Spawns the fake receiver's audio-connection thread: accepts one
/// connection on `listener` and reads 16-byte-header frames until the
/// sender closes the stream, returning each frame's payload in order.
pub fn spawn_audio_drain(listener: TcpListener) -> std::thread::JoinHandle<Vec<Vec<u8>>> {
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut frames = Vec::new();
        loop {
            let mut header = [0u8; 16];
            if stream.read_exact(&mut header).is_err() {
                break;
            }
            let payload_len = u16::from_be_bytes([header[2], header[3]]) as usize;
            let sample_len = payload_len.saturating_sub(12);
            let mut payload = vec![0u8; sample_len];
            if stream.read_exact(&mut payload).is_err() {
                break;
            }
            frames.push(payload);
        }
        frames
    })
}
