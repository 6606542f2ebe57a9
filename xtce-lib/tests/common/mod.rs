#![allow(dead_code)]
use std::path::PathBuf;

use xtce::{
    ComparisonOperator, ContainerEntryValue, ContentEntry, Database, RawBits, ValueForm,
};

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

pub fn demo_db() -> Database {
    Database::from_path(fixture_path("demo.json")).expect("failed to load demo model")
}

pub fn bits(hex: &str) -> RawBits {
    RawBits::from_hex(hex).expect("invalid hex")
}

/// `NAME == value` in calibrated form for a parameter.
pub fn param(db: &Database, name: &str, value: &str) -> ContainerEntryValue {
    let item = db.parameter(name).expect("no such parameter");
    ContainerEntryValue::new(
        db,
        item.into(),
        value,
        ComparisonOperator::Equal,
        ValueForm::Calibrated,
    )
}

pub fn starts(entries: &[ContentEntry]) -> Vec<Option<usize>> {
    entries.iter().map(|e| e.start_bit).collect()
}

pub fn calibrated(entry: &ContentEntry) -> String {
    entry
        .value
        .as_ref()
        .map(|v| v.calibrated.to_string())
        .unwrap_or_default()
}
