mod common;

use common::{bits, calibrated, demo_db, param, starts};
use test_case::test_case;
use xtce::{ContentProcessor, Database, EntryKind, ProcessOptions, RawBits};

const FIXED_OFFSET_SAMPLE: &str = "40600000000041100000fffb0000402c80000000000003";
const THERMAL_NOMINAL: &str = "000bc002000801030078008200fa01";
const THERMAL_SAFEHOLD: &str = "000bc0030005030200780082";

fn decode(db: &Database, container: &str, data: RawBits, show_all: bool) -> xtce::ContainerContentModel {
    let options = ProcessOptions::builder()
        .bits(data)
        .show_all_conditionals(show_all)
        .build();
    ContentProcessor::new(db)
        .process_container(db.container(container).unwrap(), &options)
        .unwrap()
}

#[test]
fn fixed_offset_sample() {
    let db = demo_db();
    let model = decode(&db, "FixedOffsetSample", bits(FIXED_OFFSET_SAMPLE), false);

    assert!(model.is_valid());
    assert!(model.warnings().is_empty(), "{:?}", model.warnings());
    assert_eq!(model.total_size(), 184);
    assert_eq!(model.content_list().len(), 5);
    assert_eq!(
        starts(model.content_list()),
        [0, 48, 80, 112, 176].map(Some).to_vec()
    );
    let values: Vec<String> = model.content_list().iter().map(calibrated).collect();
    assert_eq!(values, vec!["3.5", "9", "-5", "14.25", "SAFEHOLD"]);
}

#[test]
fn nested_container_in_packet() {
    let db = demo_db();
    let data = bits(&format!("000ac0010016{FIXED_OFFSET_SAMPLE}"));
    let model = decode(&db, "SamplePacket", data, false);

    assert!(model.warnings().is_empty(), "{:?}", model.warnings());
    assert_eq!(model.total_size(), 232);
    assert_eq!(model.content_list().len(), 13);

    let nested = &model.content_list()[7];
    assert_eq!(nested.kind, EntryKind::Container);
    assert_eq!(nested.path, "/Demo/FixedOffsetSample");
    assert_eq!(nested.start_bit, Some(48));
    assert_eq!(nested.size_in_bits, 184);

    let mode = model.entry("SC_MODE").unwrap();
    assert_eq!(mode.depth, 1);
    assert_eq!(mode.start_bit, Some(224));
    assert_eq!(calibrated(mode), "SAFEHOLD");
}

#[test]
fn dynamic_repeat_and_condition() {
    let db = demo_db();
    let model = decode(&db, "ThermalPacket", bits(THERMAL_NOMINAL), false);

    assert!(model.warnings().is_empty(), "{:?}", model.warnings());
    assert_eq!(model.total_size(), 120);
    let temps: Vec<_> = model
        .content_list()
        .iter()
        .filter(|e| e.name == "SENSOR_TEMP")
        .collect();
    assert_eq!(temps.len(), 3);
    assert_eq!(
        temps.iter().map(|e| calibrated(e)).collect::<Vec<_>>(),
        vec!["20", "25", "85"]
    );
    assert_eq!(
        temps.iter().map(|e| e.start_bit).collect::<Vec<_>>(),
        vec![Some(64), Some(80), Some(96)]
    );
    assert_eq!(temps[1].repeat.as_deref(), Some("Repeat 2 of 3"));

    let heater = model.entry("HEATER_ON").unwrap();
    assert_eq!(calibrated(heater), "ON");
    assert_eq!(heater.condition, "HK_MODE!=SAFEHOLD{cal}");
}

#[test_case(false, 11 ; "excluded entries are dropped")]
#[test_case(true, 12 ; "excluded entries are listed")]
fn excluded_condition(show_all: bool, count: usize) {
    let db = demo_db();
    let model = decode(&db, "ThermalPacket", bits(THERMAL_SAFEHOLD), show_all);

    assert!(model.is_valid());
    assert_eq!(model.total_size(), 96);
    assert_eq!(model.content_list().len(), count);
    assert!(model.entry("HEATER_ON").is_none());
    if show_all {
        let heater = model.content_list().last().unwrap();
        assert_eq!(heater.name, "HEATER_ON");
        assert!(!heater.is_in_use());
        assert_eq!(heater.start_bit, None);
    }
}

#[test]
fn restriction_mismatch_is_reported() {
    let db = demo_db();
    let data = bits("000ac002000801030078008200fa01");
    let model = decode(&db, "ThermalPacket", data, false);

    assert!(model.is_valid());
    assert_eq!(
        model.warnings(),
        ["CCSDS_APID 10 versus 11 due to container restriction of /Demo/Thermal/ThermalPacket"]
    );
    // the mismatch does not remove any entry
    assert_eq!(model.content_list().len(), 13);
}

#[test]
fn truncated_packet() {
    let db = demo_db();
    let data = bits("000bc002000801030078");
    let model = decode(&db, "ThermalPacket", data, false);

    assert!(!model.is_valid());
    assert_eq!(
        model.warnings(),
        ["SENSOR_TEMP at bit 80 extends past the end of the 80 bit data"]
    );
}

#[test]
fn describe_with_assumed_values() {
    let db = demo_db();
    let options = ProcessOptions::builder()
        .values(vec![
            param(&db, "HK_MODE", "SAFEHOLD"),
            param(&db, "SENSOR_COUNT", "2"),
        ])
        .show_all_conditionals(true)
        .build();
    let model = ContentProcessor::new(&db)
        .process_container(db.container("ThermalPacket").unwrap(), &options)
        .unwrap();

    // header, mode, count, two temps, and the excluded heater flag
    assert_eq!(model.content_list().len(), 12);
    assert_eq!(calibrated(model.entry("CCSDS_APID").unwrap()), "11");
    assert_eq!(calibrated(model.entry("CCSDS_GroupFlags").unwrap()), "3");
    assert_eq!(model.total_size(), 96);
    assert!(!model.content_list()[11].is_in_use());
}

#[test]
fn total_size_is_sum_of_entries() {
    let db = demo_db();
    let model = ContentProcessor::new(&db)
        .process_container(
            db.container("CCSDSPacket").unwrap(),
            &ProcessOptions::default(),
        )
        .unwrap();
    let sum: usize = model.content_list().iter().map(|e| e.size_in_bits).sum();
    assert_eq!(sum, 48);
    assert_eq!(model.total_size(), 48);
}

#[test]
fn model_serializes_to_json() {
    let db = demo_db();
    let model = decode(&db, "FixedOffsetSample", bits(FIXED_OFFSET_SAMPLE), false);
    let json = serde_json::to_value(&model).unwrap();

    assert_eq!(json["container_path"], "/Demo/FixedOffsetSample");
    assert_eq!(json["entries"][4]["name"], "SC_MODE");
    assert_eq!(json["entries"][4]["kind"], "PARAMETER");
    assert_eq!(json["entries"][4]["value"]["raw"], "0x03");
    assert_eq!(json["entries"][4]["value"]["calibrated"], "SAFEHOLD");
}
