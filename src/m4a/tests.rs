use super::*;
use std::io::Write;

fn box_header(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(body);
    out
}

/// Build a minimal, well-formed ALAC M4A: `ftyp` + `moov{mvhd,trak{mdia{mdhd,minf{stbl{stsd{alac},stts,stsz}}}}}` + `mdat`.
fn build_alac_fixture(sample_count: u32, sample_size: u32) -> Vec<u8> {
    let timescale: u32 = 44100;
    let duration_per_sample = 4096u32;

    let mut ftyp_body = Vec::new();
    ftyp_body.extend_from_slice(b"M4A ");
    ftyp_body.extend_from_slice(&0u32.to_be_bytes());
    let ftyp = box_header(b"ftyp", &ftyp_body);

    let mut mvhd_body = vec![0u8; 4]; // version 0, flags 0
    mvhd_body.extend_from_slice(&0u32.to_be_bytes()); // creation
    mvhd_body.extend_from_slice(&0u32.to_be_bytes()); // modification
    mvhd_body.extend_from_slice(&timescale.to_be_bytes());
    mvhd_body.extend_from_slice(&(sample_count * duration_per_sample).to_be_bytes());
    let mvhd = box_header(b"mvhd", &mvhd_body);

    let mut mdhd_body = vec![0u8; 4];
    mdhd_body.extend_from_slice(&0u32.to_be_bytes());
    mdhd_body.extend_from_slice(&0u32.to_be_bytes());
    mdhd_body.extend_from_slice(&timescale.to_be_bytes());
    mdhd_body.extend_from_slice(&(sample_count * duration_per_sample).to_be_bytes());
    let mdhd = box_header(b"mdhd", &mdhd_body);

    let mut alac_body = vec![0u8; 6]; // reserved
    alac_body.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    let alac = box_header(b"alac", &alac_body);

    let mut stsd_body = vec![0u8; 4]; // version+flags
    stsd_body.extend_from_slice(&1u32.to_be_bytes()); // entry count
    stsd_body.extend_from_slice(&alac);
    let stsd = box_header(b"stsd", &stsd_body);

    let mut stts_body = vec![0u8; 4];
    stts_body.extend_from_slice(&1u32.to_be_bytes()); // entry count
    stts_body.extend_from_slice(&sample_count.to_be_bytes());
    stts_body.extend_from_slice(&duration_per_sample.to_be_bytes());
    let stts = box_header(b"stts", &stts_body);

    let mut stsz_body = vec![0u8; 4];
    stsz_body.extend_from_slice(&0u32.to_be_bytes()); // fixed size = 0
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

    let mdat_body = vec![0xABu8; (sample_count * sample_size) as usize];
    let mdat = box_header(b"mdat", &mdat_body);

    let mut file = Vec::new();
    file.extend_from_slice(&ftyp);
    file.extend_from_slice(&moov);
    file.extend_from_slice(&mdat);
    file
}

fn write_fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn parses_well_formed_alac_file() {
    let bytes = build_alac_fixture(108, 256);
    let fixture = write_fixture(&bytes);

    let m4a = M4AFile::open(fixture.path(), None).unwrap();
    assert_eq!(m4a.encoding(), Encoding::Alac);
    // duration = 108 samples * 4096 frames/sample = 442368 timescale ticks
    // at 44100 Hz: 10s plus a remainder, not an exact round number.
    let (secs, nanos) = m4a.length();
    assert_eq!(secs, 10);
    assert!(nanos > 0);
    assert_eq!(m4a.samples_count(), 108);
    assert_eq!(m4a.largest_sample_size(), 256);
    assert_eq!(m4a.status(), ParseStatus::Ok);
}

#[test]
fn unknown_annotation_invokes_metadata_handler() {
    let mut bytes = build_alac_fixture(4, 16);

    let mut data_body = vec![0u8; 4]; // version+flags = 0x00000000 (binary)
    data_body.extend_from_slice(&0u32.to_be_bytes()); // reserved
    data_body.extend_from_slice(&[1, 2, 3, 4]);
    let data = box_header(b"data", &data_body);
    let annotation = box_header(b"9xyz", &data);
    let ilst = box_header(b"ilst", &annotation);
    let meta_body = {
        let mut b = vec![0u8; 4];
        b.extend_from_slice(&ilst);
        b
    };
    let meta = box_header(b"meta", &meta_body);
    let udta = box_header(b"udta", &meta);

    // Splice the udta box into moov, right after its existing children.
    let moov_start = 8 + 0; // ftyp box is first
    let ftyp_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let moov_pos = ftyp_len;
    let moov_len = u32::from_be_bytes(bytes[moov_pos..moov_pos + 4].try_into().unwrap()) as usize;
    let insert_at = moov_pos + moov_len;
    bytes.splice(insert_at..insert_at, udta.iter().copied());
    // Fix up moov's declared size to include the new udta child.
    let new_moov_len = (moov_len + udta.len()) as u32;
    bytes[moov_pos..moov_pos + 4].copy_from_slice(&new_moov_len.to_be_bytes());
    let _ = moov_start;

    let fixture = write_fixture(&bytes);

    let mut seen = Vec::new();
    {
        let mut handler = |box_type: u32, payload: &[u8], kind: MetadataKind| {
            seen.push((box_type, payload.to_vec(), kind));
        };
        let m4a = M4AFile::open(fixture.path(), Some(&mut handler)).unwrap();
        assert_eq!(m4a.status(), ParseStatus::Ok);
    }
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, u32::from_be_bytes(*b"9xyz"));
    assert_eq!(seen[0].1, vec![1, 2, 3, 4]);
    assert_eq!(seen[0].2, MetadataKind::Binary);
}

#[test]
fn without_handler_metadata_box_is_skipped_cleanly() {
    let bytes = build_alac_fixture(4, 16);
    let fixture = write_fixture(&bytes);
    let m4a = M4AFile::open(fixture.path(), None).unwrap();
    assert_eq!(m4a.status(), ParseStatus::Ok);
}

#[test]
fn trailing_byte_after_final_box_is_tolerated() {
    let mut bytes = build_alac_fixture(2, 8);
    bytes.push(0xFF);
    let fixture = write_fixture(&bytes);
    let m4a = M4AFile::open(fixture.path(), None).unwrap();
    assert_eq!(m4a.status(), ParseStatus::Ok);
}

#[test]
fn undersized_box_forces_skip_with_warning() {
    let mut bytes = build_alac_fixture(4, 16);
    // Corrupt stsz's declared sample_count so the table read runs past
    // the box's actual declared size, forcing an early-truncated read.
    let needle = b"stsz";
    let pos = bytes
        .windows(4)
        .position(|w| w == needle)
        .expect("stsz present");
    let box_start = pos - 4;
    // bump the recorded sample_count field (12 bytes into the stsz body)
    let count_pos = pos + 4 + 4 + 4;
    bytes[count_pos..count_pos + 4].copy_from_slice(&999u32.to_be_bytes());
    let _ = box_start;

    let fixture = write_fixture(&bytes);
    let m4a = M4AFile::open(fixture.path(), None).unwrap();
    assert_eq!(m4a.status(), ParseStatus::ParsedWithWarnings);
}

#[test]
fn set_sample_offset_lands_on_expected_index() {
    let bytes = build_alac_fixture(200, 64);
    let fixture = write_fixture(&bytes);
    let mut m4a = M4AFile::open(fixture.path(), None).unwrap();

    assert!(m4a
        .set_sample_offset(Duration::from_secs(5))
        .unwrap());
    assert_eq!(m4a.current_sample_index(), 53); // floor(5 * 44100 / 4096)
}

#[test]
fn set_sample_offset_rejects_past_end() {
    let bytes = build_alac_fixture(4, 16);
    let fixture = write_fixture(&bytes);
    let mut m4a = M4AFile::open(fixture.path(), None).unwrap();
    assert!(!m4a.set_sample_offset(Duration::from_secs(3600)).unwrap());
}

#[test]
fn next_sample_reads_declared_sizes_in_order() {
    let bytes = build_alac_fixture(3, 4);
    let fixture = write_fixture(&bytes);
    let mut m4a = M4AFile::open(fixture.path(), None).unwrap();
    let mut buf = vec![0u8; m4a.largest_sample_size() as usize];
    let mut count = 0;
    while m4a.has_more_samples() {
        let n = m4a.next_sample(&mut buf).unwrap();
        assert_eq!(n, 4);
        count += 1;
    }
    assert_eq!(count, 3);
}

#[test]
fn sample_source_is_independent_of_the_parent_cursors() {
    let bytes = build_alac_fixture(10, 8);
    let fixture = write_fixture(&bytes);
    let m4a = M4AFile::open(fixture.path(), None).unwrap();

    let mut source = m4a.sample_source(Duration::from_secs(0)).unwrap();
    let mut buf = vec![0u8; source.largest_sample_size() as usize];
    let mut count = 0;
    while source.has_more_samples() {
        source.next_sample(&mut buf).unwrap();
        count += 1;
    }
    assert_eq!(count, 10);
}
