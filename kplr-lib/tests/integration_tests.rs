mod common;

use std::fs;

use kplr::dataset::Anomaly;
use kplr::dmc::DmcRepackager;
use kplr::pipeline::{InputFormat, Pipeline, ReaderConfig};
use kplr::spacepacket::{
    Apid, CcsdsHeader, HeaderFields, PacketId, ValidationError, BASELINE, ENCODED, FFI_CADENCE,
    LONG_CADENCE, RESIDUAL_BASELINE, SHORT_CADENCE,
};
use kplr::Error;
use rand::{rngs::StdRng, Rng, SeedableRng};

use common::{packet, write_file};

#[test]
fn validate_random_headers() {
    let mut rng = StdRng::seed_from_u64(7);
    let apids = [LONG_CADENCE, SHORT_CADENCE, FFI_CADENCE, 2047];
    let packet_ids: Vec<PacketId> = [100u8, 101, 102, 103, 104, 0x5a]
        .into_iter()
        .chain(106..=120)
        .chain(122..=124)
        .collect();

    for _ in 0..1000 {
        let apid: Apid = apids[rng.gen_range(0..apids.len())];
        let packet_id = packet_ids[rng.gen_range(0..packet_ids.len())];
        let mut fields = HeaderFields::builder()
            .apid(apid)
            .packet_id(packet_id)
            .sequence_count(rng.gen_range(0..=16383))
            .data_length(rng.gen_range(7..=16373))
            .seconds(rng.gen())
            .subseconds(rng.gen())
            .build();
        let header = CcsdsHeader::decode(&fields.encode());
        assert_eq!(header.validate(), Ok(()), "{header}");

        fields.version = rng.gen_range(1..8);
        let err = CcsdsHeader::decode(&fields.encode())
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), "versionNumber");
        assert_eq!(
            err,
            ValidationError::Version {
                actual: fields.version
            }
        );
    }
}

#[test]
fn sct_entries_are_ordered_and_disjoint() {
    let mut rng = StdRng::seed_from_u64(42);
    let kinds = [
        (LONG_CADENCE, BASELINE),
        (LONG_CADENCE, RESIDUAL_BASELINE),
        (SHORT_CADENCE, BASELINE),
        (SHORT_CADENCE, ENCODED),
        (FFI_CADENCE, 112),
    ];
    let mut seqs = std::collections::HashMap::new();
    let mut dat = Vec::new();
    let mut seconds = 0;
    for _ in 0..300 {
        let (apid, packet_id) = kinds[rng.gen_range(0..kinds.len())];
        if rng.gen_bool(0.2) {
            seconds += 1;
        }
        let seq: &mut u16 = seqs.entry((apid, packet_id)).or_default();
        dat.extend(packet(apid, packet_id, *seq, seconds, rng.gen_range(14..500)));
        *seq += 1;
    }

    let mut sct = Vec::new();
    let config = ReaderConfig::builder().format(InputFormat::Packets).build();
    let report = Pipeline::new(config)
        .with_sct(&mut sct)
        .run(kplr::source::PacketHeaders::new(std::io::Cursor::new(dat)))
        .unwrap();

    assert_eq!(report.packets, 300);
    assert!(!report
        .anomalies
        .iter()
        .any(|a| matches!(a, Anomaly::DroppedPacket { .. })));
    assert_eq!(
        String::from_utf8(sct).unwrap().lines().count(),
        report.sct_entries.len()
    );
    for (i, entry) in report.sct_entries.iter().enumerate() {
        assert_eq!(entry.index, i as u64);
        assert!(matches!(entry.apid, LONG_CADENCE | FFI_CADENCE));
        assert!(entry.length > 0);
    }
    for pair in report.sct_entries.windows(2) {
        assert!(pair[0].offset + pair[0].length <= pair[1].offset);
    }
}

#[test]
fn sct_entries_are_contiguous_without_short_cadence() {
    let mut rng = StdRng::seed_from_u64(1009);
    let kinds = [
        (LONG_CADENCE, BASELINE),
        (LONG_CADENCE, RESIDUAL_BASELINE),
        (FFI_CADENCE, 110),
        (FFI_CADENCE, 112),
    ];
    let mut seqs = std::collections::HashMap::new();
    let mut dat = Vec::new();
    let mut units = 0;
    let mut seconds = 0;
    for _ in 0..300 {
        let (apid, packet_id) = kinds[rng.gen_range(0..kinds.len())];
        if rng.gen_bool(0.2) {
            seconds += 1;
        }
        let seq: &mut u16 = seqs.entry((apid, packet_id)).or_default();
        let pkt = packet(apid, packet_id, *seq, seconds, rng.gen_range(14..500));
        units += kplr::dataset::storage_units(&CcsdsHeader::from_slice(&pkt).unwrap());
        dat.extend(pkt);
        *seq += 1;
    }

    let config = ReaderConfig::builder().format(InputFormat::Packets).build();
    let report = Pipeline::new(config)
        .run(kplr::source::PacketHeaders::new(std::io::Cursor::new(dat)))
        .unwrap();

    let entries = &report.sct_entries;
    assert_eq!(entries[0].offset, 0);
    for pair in entries.windows(2) {
        assert_eq!(pair[0].offset + pair[0].length, pair[1].offset, "{pair:?}");
    }
    let last = entries.last().unwrap();
    assert_eq!(last.offset + last.length, units);
}

#[test]
fn dropped_packets_reported_in_stream_order() {
    let packets = [
        packet(LONG_CADENCE, BASELINE, 10, 1, 30),
        packet(SHORT_CADENCE, BASELINE, 500, 1, 30),
        packet(LONG_CADENCE, BASELINE, 12, 1, 30),
        packet(SHORT_CADENCE, BASELINE, 503, 1, 30),
    ];
    let config = ReaderConfig::builder().format(InputFormat::Packets).build();
    let report = Pipeline::new(config)
        .run(kplr::source::PacketHeaders::new(std::io::Cursor::new(
            packets.concat(),
        )))
        .unwrap();

    let dropped: Vec<(u64, u16, u16)> = report
        .anomalies
        .iter()
        .filter_map(|a| match a {
            Anomaly::DroppedPacket {
                offset,
                expected,
                actual,
                ..
            } => Some((*offset, *expected, *actual)),
            _ => None,
        })
        .collect();
    assert_eq!(dropped, vec![(60, 11, 12), (90, 501, 503)]);
    assert!(report.anomalies[0].to_string().contains("dropped packet?"));
}

#[test]
fn run_file_with_dmc() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("dmc");
    fs::create_dir(&out).unwrap();

    let packets = [
        packet(SHORT_CADENCE, BASELINE, 0, 100, 200),
        packet(SHORT_CADENCE, BASELINE, 1, 100, 200),
        packet(FFI_CADENCE, 110, 0, 100, 200),
        packet(SHORT_CADENCE, BASELINE, 2, 160, 200),
        packet(SHORT_CADENCE, BASELINE, 3, 160, 200),
    ];
    let input = write_file(dir.path(), "packets.dat", &packets.concat());

    let config = ReaderConfig::builder().format(InputFormat::Packets).build();
    let report = Pipeline::new(config)
        .with_dmc(DmcRepackager::new(&out))
        .run_file(&input)
        .unwrap();

    let names: Vec<String> = report
        .dmc_files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["kplr2000001120140a.scb", "kplr2000001120240a.scb"]
    );
    for path in &report.dmc_files {
        let data = fs::read(path).unwrap();
        assert_eq!(data.len(), 2 * CcsdsHeader::MAX_PACKET_LEN);
        // packets differ only in their headers
        assert_eq!(&data[CcsdsHeader::LEN..200], &packets[0][CcsdsHeader::LEN..]);
        assert!(data[200..CcsdsHeader::MAX_PACKET_LEN].iter().all(|b| *b == 0));
    }
}

#[test]
fn run_file_stops_on_invalid_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut bad = packet(LONG_CADENCE, BASELINE, 1, 1, 40);
    bad[11] = 105;
    let dat = [packet(LONG_CADENCE, BASELINE, 0, 1, 40), bad].concat();
    let input = write_file(dir.path(), "packets.dat", &dat);

    let config = ReaderConfig::builder()
        .format(InputFormat::Packets)
        .stop_on_error(true)
        .build();
    let err = Pipeline::new(config).run_file(&input).unwrap_err();
    match err {
        Error::InvalidHeader {
            offset,
            packet,
            source,
        } => {
            assert_eq!(offset, 40);
            assert_eq!(packet, 1);
            assert_eq!(source, ValidationError::PacketId { actual: 105 });
        }
        err => panic!("unexpected error {err:?}"),
    }
}

#[test]
fn run_file_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let zult = Pipeline::new(ReaderConfig::default()).run_file(dir.path().join("missing.dat"));
    assert!(matches!(zult, Err(Error::Io(_))));
}
