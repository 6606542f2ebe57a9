use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;
use xtce::{ContainerContentModel, ContentProcessor, Database, ProcessOptions, RawBits};

use crate::{
    encode::{parse_values, Target},
    render::{self, Format},
};

#[derive(Debug, Serialize)]
struct Row {
    name: String,
    depth: usize,
    start: Option<usize>,
    size: usize,
    raw: String,
    value: String,
    units: String,
    condition: String,
    repeat: String,
    in_use: bool,
}

#[derive(Debug, Serialize)]
struct Decoded<'a> {
    container: &'a str,
    total_size: usize,
    valid: bool,
    rows: Vec<Row>,
    warnings: &'a [String],
}

fn rows(db: &Database, model: &ContainerContentModel) -> Vec<Row> {
    model
        .content_list()
        .iter()
        .map(|e| Row {
            name: e.name.clone(),
            depth: e.depth,
            start: e.start_bit,
            size: e.size_in_bits,
            raw: e.value.as_ref().map(|v| v.raw.to_hex()).unwrap_or_default(),
            value: e
                .value
                .as_ref()
                .map(|v| v.calibrated.to_string())
                .unwrap_or_default(),
            units: e
                .item
                .and_then(|item| db.type_of(item).units.clone())
                .unwrap_or_default(),
            condition: e.condition.clone(),
            repeat: e.repeat.clone().unwrap_or_default(),
            in_use: e.is_in_use(),
        })
        .collect()
}

pub fn decode(
    db: &Database,
    target: Target,
    data: Option<RawBits>,
    set: &[String],
    show_all: bool,
    format: &Format,
) -> Result<()> {
    let values = parse_values(db, target, set)?;
    let options = match data {
        Some(bits) => ProcessOptions::builder()
            .bits(bits)
            .values(values)
            .show_all_conditionals(show_all)
            .build(),
        None => ProcessOptions::builder()
            .values(values)
            .show_all_conditionals(show_all)
            .build(),
    };
    let processor = ContentProcessor::new(db);
    let model = match target {
        Target::Container(cid) => processor.process_container(cid, &options),
        Target::Command(cid) => processor.process_command(cid, &options),
    }
    .context("processing container")?;

    for warning in model.warnings() {
        warn!("{warning}");
    }
    let decoded = Decoded {
        container: model.container_path(),
        total_size: model.total_size(),
        valid: model.is_valid(),
        rows: rows(db, &model),
        warnings: model.warnings(),
    };
    render::write(format, "decode", TEXT_TEMPLATE, &decoded)
}

const TEXT_TEMPLATE: &str = r"{{ container }} ({{ total_size }} bits{{ #unless valid }}, truncated{{ /unless }})
===============================================================================================
Start   Size  Name                              Value
-----------------------------------------------------------------------------------------------
{{ #each rows }}{{ lpad 5 start }}  {{ lpad 4 size }}  {{ indent depth }}{{ name }}{{ #if in_use }}  {{ value }} {{ units }}{{ else }}  (not in use){{ /if }}{{ #if repeat }}  [{{ repeat }}]{{ /if }}{{ #if condition }}  if {{ condition }}{{ /if }}
{{ /each }}";
