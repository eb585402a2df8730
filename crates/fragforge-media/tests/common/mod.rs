//! Byte-level fixture builders shared by the integration tests.
#![allow(dead_code)]

use bytes::{BufMut, BytesMut};

pub const FLAGS_SYNC: u32 = 0x0200_0000;
pub const FLAGS_NON_SYNC: u32 = 0x0101_0000;

/// One explicitly described sample: (duration, size, flags).
pub type SampleSpec = (u32, u32, u32);

pub fn atom(ty: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + body.len());
    buf.put_u32(8 + body.len() as u32);
    buf.put_slice(ty);
    buf.put_slice(body);
    buf.to_vec()
}

pub fn full_atom(ty: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32((version as u32) << 24 | flags);
    buf.put_slice(body);
    atom(ty, &buf)
}

pub fn container(ty: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    atom(ty, &children.concat())
}

pub fn ftyp() -> Vec<u8> {
    atom(b"ftyp", b"iso6\0\0\0\0iso6cmfc")
}

pub fn mvhd() -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(0); // creation_time
    body.put_u32(0); // modification_time
    body.put_u32(1000);
    body.put_u32(0);
    body.put_i32(0x0001_0000);
    body.put_i16(0x0100);
    body.put_bytes(0, 10);
    body.put_bytes(0, 36);
    body.put_bytes(0, 24);
    body.put_u32(2);
    full_atom(b"mvhd", 0, 0, &body)
}

pub fn tkhd(track_id: u32) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(0);
    body.put_u32(0);
    body.put_u32(track_id);
    body.put_u32(0);
    body.put_u32(0);
    body.put_bytes(0, 8);
    body.put_i16(0);
    body.put_i16(0);
    body.put_i16(0);
    body.put_u16(0);
    body.put_bytes(0, 36);
    body.put_u32(1280 << 16);
    body.put_u32(720 << 16);
    full_atom(b"tkhd", 0, 3, &body)
}

pub fn mdhd_v0(timescale: u32) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(0);
    body.put_u32(0);
    body.put_u32(timescale);
    body.put_u32(0);
    body.put_u16(0x15C7); // eng
    body.put_u16(0);
    full_atom(b"mdhd", 0, 0, &body)
}

pub fn mdhd_v1(timescale: u32) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u64(0);
    body.put_u64(0);
    body.put_u32(timescale);
    body.put_u64(0);
    body.put_u16(0x15C7);
    body.put_u16(0);
    full_atom(b"mdhd", 1, 0, &body)
}

pub fn hdlr() -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(0);
    body.put_slice(b"vide");
    body.put_bytes(0, 12);
    body.put_slice(b"VideoHandler\0");
    full_atom(b"hdlr", 0, 0, &body)
}

pub fn trex(track_id: u32) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(track_id);
    body.put_u32(1);
    body.put_u32(0);
    body.put_u32(0);
    body.put_u32(0);
    full_atom(b"trex", 0, 0, &body)
}

/// moov(mvhd, trak(tkhd, mdia(mdhd, hdlr)), mvex(trex)).
pub fn movie(mdhd: Vec<u8>) -> Vec<u8> {
    container(
        b"moov",
        &[
            mvhd(),
            container(
                b"trak",
                &[tkhd(1), container(b"mdia", &[mdhd, hdlr()])],
            ),
            container(b"mvex", &[trex(1)]),
        ],
    )
}

pub fn mfhd(sequence_number: u32) -> Vec<u8> {
    full_atom(b"mfhd", 0, 0, &sequence_number.to_be_bytes())
}

/// tfhd whose optional fields are given in wire order.
pub fn tfhd(track_id: u32, flags: u32, fields: &[u32]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(track_id);
    for field in fields {
        body.put_u32(*field);
    }
    full_atom(b"tfhd", 0, flags, &body)
}

pub fn tfhd_with_base_offset(track_id: u32, base_data_offset: u64) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(track_id);
    body.put_u64(base_data_offset);
    full_atom(b"tfhd", 0, 0x000001, &body)
}

pub fn tfdt_v0(time: u32) -> Vec<u8> {
    full_atom(b"tfdt", 0, 0, &time.to_be_bytes())
}

/// trun with explicit duration, size and flags per sample.
pub fn trun(data_offset: Option<i32>, samples: &[SampleSpec]) -> Vec<u8> {
    let mut flags = 0x000100 | 0x000200 | 0x000400;
    let mut body = BytesMut::new();
    body.put_u32(samples.len() as u32);
    if let Some(offset) = data_offset {
        flags |= 0x000001;
        body.put_i32(offset);
    }
    for (duration, size, sample_flags) in samples {
        body.put_u32(*duration);
        body.put_u32(*size);
        body.put_u32(*sample_flags);
    }
    full_atom(b"trun", 0, flags, &body)
}

pub fn sample_data(samples: &[SampleSpec]) -> Vec<u8> {
    samples
        .iter()
        .enumerate()
        .flat_map(|(i, (_, size, _))| std::iter::repeat(i as u8).take(*size as usize))
        .collect()
}

/// moof(mfhd, traf(tfhd, tfdt, trun)) + mdat with a correct data offset.
pub fn fragment(sequence_number: u32, samples: &[SampleSpec]) -> Vec<u8> {
    let build = |data_offset: i32| {
        container(
            b"moof",
            &[
                mfhd(sequence_number),
                container(
                    b"traf",
                    &[
                        tfhd(1, 0x020000, &[]),
                        tfdt_v0(sequence_number * 90_000),
                        trun(Some(data_offset), samples),
                    ],
                ),
            ],
        )
    };
    let moof_size = build(0).len() as i32;
    let mut out = build(moof_size + 8);
    out.extend_from_slice(&atom(b"mdat", &sample_data(samples)));
    out
}

pub fn three_samples() -> Vec<SampleSpec> {
    vec![(4000, 1000, 0x0101_0000); 3]
}
