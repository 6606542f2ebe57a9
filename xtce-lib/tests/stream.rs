mod common;

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;

use common::{calibrated, demo_db};
use xtce::{spacepacket::decode_packets, Error, RawBits, StreamProcessor};

const PACKETS: [&str; 5] = [
    "000ac001001640600000000041100000fffb0000402c80000000000003",
    "000bc002000801030078008200fa01",
    "000bc0030005030200780082",
    // no container for APID 12
    "000cc0040000ff",
    "000bc005000801010078008200fa00",
];

fn write_packets() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for packet in PACKETS {
        file.write_all(&hex::decode(packet).unwrap()).unwrap();
    }
    file.flush().unwrap();
    file
}

fn read_packets(file: &tempfile::NamedTempFile) -> Vec<RawBits> {
    decode_packets(File::open(file.path()).unwrap())
        .map(|zult| zult.unwrap().bits())
        .collect()
}

#[test]
fn identify_packets_from_file() {
    let db = demo_db();
    let stream = StreamProcessor::new(&db, db.stream("Telemetry").unwrap());
    let file = write_packets();
    let packets = read_packets(&file);
    assert_eq!(packets.len(), 5);

    let mut counts: HashMap<String, usize> = HashMap::default();
    let mut failures = 0;
    for packet in &packets {
        match stream.process_stream(packet) {
            Ok(model) => *counts.entry(model.container_path().to_string()).or_default() += 1,
            Err(Error::NoCompatibleContainer { stream }) => {
                assert_eq!(stream, "/Demo/Telemetry");
                failures += 1;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(failures, 1);
    assert_eq!(counts["/Demo/Power/SamplePacket"], 1);
    assert_eq!(counts["/Demo/Thermal/ThermalPacket"], 3);
}

#[test]
fn candidates_exclude_abstract_and_command_containers() {
    let db = demo_db();
    let stream = StreamProcessor::new(&db, db.stream("Telemetry").unwrap());
    let paths: Vec<&str> = stream
        .candidates()
        .iter()
        .map(|c| db.container_by_id(*c).path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec!["/Demo/Power/SamplePacket", "/Demo/Thermal/ThermalPacket"]
    );
}

#[test]
fn include_and_exclude_lists() {
    let db = demo_db();
    let stream = StreamProcessor::new(&db, db.stream("Telemetry").unwrap());
    let thermal = db.container("ThermalPacket").unwrap();
    let tlm = db.container("TlmPacket").unwrap();
    let sample = RawBits::from_hex(PACKETS[0]).unwrap();
    let hk = RawBits::from_hex(PACKETS[1]).unwrap();

    assert!(stream
        .process_stream_include_only(&sample, &[thermal])
        .unwrap()
        .is_none());
    let model = stream
        .process_stream_include_only(&hk, &[thermal])
        .unwrap()
        .unwrap();
    assert_eq!(calibrated(model.entry("HK_MODE").unwrap()), "NOMINAL");

    // membership includes derived containers
    assert!(stream
        .process_stream_with_excludes(&hk, &[tlm])
        .unwrap()
        .is_none());
    assert!(stream
        .process_stream_with_excludes(&sample, &[thermal])
        .unwrap()
        .is_some());

    let unknown = RawBits::from_hex(PACKETS[3]).unwrap();
    assert!(matches!(
        stream.process_stream_include_only(&unknown, &[thermal]),
        Err(Error::NoCompatibleContainer { .. })
    ));
}

#[test]
fn parallel_processing_keeps_order() {
    let db = demo_db();
    let stream = StreamProcessor::new(&db, db.stream("Telemetry").unwrap());
    let file = write_packets();
    let packets = read_packets(&file);

    let results = stream.process_many(&packets);
    assert_eq!(results.len(), packets.len());
    assert!(results[3].is_err());

    let last = results[4].as_ref().unwrap();
    assert_eq!(calibrated(last.entry("CCSDS_Count").unwrap()), "5");
    assert_eq!(calibrated(last.entry("HEATER_ON").unwrap()), "OFF");
    let temps: Vec<String> = last
        .content_list()
        .iter()
        .filter(|e| e.name == "SENSOR_TEMP")
        .map(calibrated)
        .collect();
    assert_eq!(temps, vec!["20"]);
}
