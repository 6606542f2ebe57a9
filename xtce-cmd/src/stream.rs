use std::{collections::BTreeMap, fs::File, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};
use xtce::{
    spacepacket::{decode_packets, Apid},
    ContainerId, Database, Error, StreamProcessor,
};

use crate::render::{self, Format};

pub struct Opts {
    pub stream: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub verbose: bool,
}

#[derive(Default, Debug, Clone, Serialize)]
struct ContainerSummary {
    packets: usize,
    warnings: usize,
    truncated: usize,
}

#[derive(Debug, Clone, Serialize)]
struct PacketRecord {
    offset: usize,
    apid: Apid,
    container: String,
    values: Vec<(String, String)>,
    warnings: Vec<String>,
}

#[derive(Default, Debug, Clone, Serialize)]
struct Summary {
    stream: String,
    total_packets: usize,
    skipped: usize,
    unidentified: BTreeMap<Apid, usize>,
    containers: BTreeMap<String, ContainerSummary>,
    packets: Vec<PacketRecord>,
}

fn lookup_all(db: &Database, names: &[String]) -> Result<Vec<ContainerId>> {
    names
        .iter()
        .map(|n| db.container(n).with_context(|| format!("invalid container '{n}'")))
        .collect()
}

fn summarize(db: &Database, opts: &Opts, input: &Path) -> Result<Summary> {
    let stream_id = db.stream(&opts.stream)?;
    let processor = StreamProcessor::new(db, stream_id);
    let include = lookup_all(db, &opts.include)?;
    let exclude = lookup_all(db, &opts.exclude)?;

    let reader = File::open(input).with_context(|| format!("opening {input:?}"))?;
    let mut summary = Summary {
        stream: db.stream_by_id(stream_id).path.clone(),
        ..Summary::default()
    };

    for packet in decode_packets(reader) {
        let packet = packet.context("reading packets")?;
        summary.total_packets += 1;
        let bits = packet.bits();
        let zult = if include.is_empty() {
            processor.process_stream_with_excludes(&bits, &exclude)
        } else {
            processor
                .process_stream_include_only(&bits, &include)
                .map(|m| m.filter(|m| !exclude.iter().any(|c| db.inherits_from(m.container(), *c))))
        };
        let model = match zult {
            Ok(Some(model)) => model,
            Ok(None) => {
                summary.skipped += 1;
                continue;
            }
            Err(Error::NoCompatibleContainer { .. }) => {
                debug!(apid = packet.header.apid, offset = packet.offset, "no container");
                *summary.unidentified.entry(packet.header.apid).or_default() += 1;
                continue;
            }
            Err(err) => return Err(err).context("processing packet"),
        };

        for warning in model.warnings() {
            warn!(offset = packet.offset, "{warning}");
        }
        let entry = summary
            .containers
            .entry(model.container_path().to_string())
            .or_default();
        entry.packets += 1;
        entry.warnings += model.warnings().len();
        entry.truncated += usize::from(!model.is_valid());

        if opts.verbose {
            summary.packets.push(PacketRecord {
                offset: packet.offset,
                apid: packet.header.apid,
                container: model.container_path().to_string(),
                values: model
                    .content_list()
                    .iter()
                    .filter_map(|e| Some((e.name.clone(), e.value.as_ref()?.to_string())))
                    .collect(),
                warnings: model.warnings().to_vec(),
            });
        }
    }
    Ok(summary)
}

pub fn stream(db: &Database, opts: &Opts, input: &Path, format: &Format) -> Result<()> {
    let summary = summarize(db, opts, input)?;
    render::write(format, "stream", TEXT_TEMPLATE, &summary)
}

const TEXT_TEMPLATE: &str = r"{{ stream }}
===============================================================================================
Packets:      {{ total_packets }}
Skipped:      {{ skipped }}
Unidentified: {{ #each unidentified }}{{ @key }}={{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
-----------------------------------------------------------------------------------------------
Container                                                       Count  Warnings  Truncated
-----------------------------------------------------------------------------------------------
{{ #each containers }}{{ @key }}
{{ lpad 68 packets }}  {{ lpad 8 warnings }}  {{ lpad 9 truncated }}
{{ /each }}{{ #each packets }}
{{ offset }} apid={{ apid }} {{ container }}
{{ #each values }}    {{ this.[0] }} = {{ this.[1] }}
{{ /each }}{{ #each warnings }}    warning: {{ this }}
{{ /each }}{{ /each }}";
