#![allow(dead_code)]
use std::path::{Path, PathBuf};

use kplr::framing::{FrameGeometry, VcduHeader};
use kplr::spacepacket::{Apid, CcsdsHeader, HeaderFields, PacketId, FILL_BYTE};

/// A packet of `total` bytes, header included, with a recognizable fill pattern.
pub fn packet(apid: Apid, packet_id: PacketId, seq: u16, seconds: u32, total: usize) -> Vec<u8> {
    assert!(total >= CcsdsHeader::LEN);
    let mut dat = HeaderFields::builder()
        .apid(apid)
        .packet_id(packet_id)
        .sequence_count(seq)
        .data_length((total - CcsdsHeader::PRIMARY_LEN) as u16)
        .seconds(seconds)
        .build()
        .encode()
        .to_vec();
    dat.extend((0..total - CcsdsHeader::LEN).map(|i| (i % 251) as u8));
    dat
}

pub fn vcdu(geometry: &FrameGeometry, counter: u32, fhp: u16) -> Vec<u8> {
    VcduHeader {
        version: 1,
        scid: 227,
        vcid: 3,
        counter,
        replay: false,
        first_header_pointer: fhp,
    }
    .encode(geometry)
}

/// Lay `packets` back to back in the payloads of consecutive frames, setting each
/// frame's first-header-pointer. The last frame is padded with fill bytes, which read
/// as a single fill header if there are at least a header's worth.
pub fn frames(geometry: &FrameGeometry, packets: &[Vec<u8>], start_counter: u32) -> Vec<u8> {
    let payload = geometry.payload_length();
    let mut stream = Vec::new();
    let mut starts = Vec::new();
    for p in packets {
        starts.push(stream.len());
        stream.extend(p);
    }

    let mut out = Vec::new();
    for (i, chunk) in stream.chunks(payload).enumerate() {
        let lo = i * payload;
        let fhp = starts
            .iter()
            .find(|s| **s >= lo && **s < lo + payload)
            .map_or(VcduHeader::NO_CCSDS_HEADER, |s| (s - lo) as u16);
        out.extend(vcdu(geometry, start_counter + i as u32, fhp));
        out.extend(chunk);
        out.resize(out.len() + payload - chunk.len(), FILL_BYTE);
    }
    out
}

/// A frame with only continuation data.
pub fn continuation_frame(geometry: &FrameGeometry, counter: u32) -> Vec<u8> {
    let mut dat = vcdu(geometry, counter, VcduHeader::NO_CCSDS_HEADER);
    dat.resize(geometry.frame_length, 0);
    dat
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).expect("failed to write fixture");
    path
}
