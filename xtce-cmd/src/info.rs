use anyhow::Result;
use serde::Serialize;
use xtce::{ContentProcessor, Database, ProcessOptions};

use crate::render::{self, Format};

#[derive(Debug, Clone, Serialize)]
struct ContainerInfo {
    path: String,
    base: Option<String>,
    is_abstract: bool,
    restrictions: Vec<String>,
    entries: usize,
    /// Size when every entry has a fixed size, as laid out with no data.
    size_in_bits: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct CommandInfo {
    path: String,
    base: Option<String>,
    is_abstract: bool,
    arguments: Vec<String>,
    assignments: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct StreamInfo {
    path: String,
    root: String,
    candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    space_systems: Vec<String>,
    parameters: usize,
    containers: Vec<ContainerInfo>,
    commands: Vec<CommandInfo>,
    streams: Vec<StreamInfo>,
}

fn summarize(db: &Database) -> Info {
    let processor = ContentProcessor::new(db);
    let containers = db
        .containers()
        .filter(|(_, c)| c.command.is_none())
        .map(|(cid, c)| {
            let size_in_bits = processor
                .process_container(cid, &ProcessOptions::default())
                .ok()
                .filter(|m| m.content_list().iter().all(|e| e.is_in_use()))
                .map(|m| m.total_size());
            ContainerInfo {
                path: c.path.clone(),
                base: c.base.map(|b| db.container_by_id(b).path.clone()),
                is_abstract: c.is_abstract,
                restrictions: c.restrictions.iter().map(ToString::to_string).collect(),
                entries: c.entries.len(),
                size_in_bits,
            }
        })
        .collect();
    let commands = db
        .meta_commands()
        .map(|(_, cmd)| CommandInfo {
            path: cmd.path.clone(),
            base: cmd.base.map(|b| db.meta_command_by_id(b).path.clone()),
            is_abstract: cmd.is_abstract,
            arguments: cmd
                .arguments
                .iter()
                .map(|a| db.item((*a).into()).name.clone())
                .collect(),
            assignments: cmd.assignments.iter().map(ToString::to_string).collect(),
        })
        .collect();
    let streams = db
        .streams()
        .map(|(_, s)| StreamInfo {
            path: s.path.clone(),
            root: db.container_by_id(s.root).path.clone(),
            candidates: s
                .candidates
                .iter()
                .map(|c| db.container_by_id(*c).path.clone())
                .collect(),
        })
        .collect();

    Info {
        space_systems: db.space_systems().map(|s| s.path.clone()).collect(),
        parameters: db.parameters().count(),
        containers,
        commands,
        streams,
    }
}

pub fn info(db: &Database, format: &Format) -> Result<()> {
    render::write(format, "info", TEXT_TEMPLATE, &summarize(db))
}

const TEXT_TEMPLATE: &str = r"Space Systems: {{ #each space_systems }}{{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
Parameters:    {{ parameters }}
===============================================================================================
Container                                            Entries     Bits  Base
-----------------------------------------------------------------------------------------------
{{ #each containers }}{{ path }}{{ #if is_abstract }} (abstract){{ /if }}
{{ lpad 60 entries }}  {{ lpad 7 size_in_bits }}  {{ base }}
{{ #each restrictions }}    restriction {{ this }}
{{ /each }}{{ /each }}
===============================================================================================
Meta Command
-----------------------------------------------------------------------------------------------
{{ #each commands }}{{ path }}{{ #if is_abstract }} (abstract){{ /if }}{{ #if base }} extends {{ base }}{{ /if }}
    arguments: {{ #each arguments }}{{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
{{ #each assignments }}    assignment {{ this }}
{{ /each }}{{ /each }}
===============================================================================================
Stream
-----------------------------------------------------------------------------------------------
{{ #each streams }}{{ path }} ({{ root }})
{{ #each candidates }}    {{ this }}
{{ /each }}{{ /each }}";
