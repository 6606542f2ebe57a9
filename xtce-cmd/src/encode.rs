use std::{fs::File, io::Write, path::Path};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::{info, warn};
use xtce::{
    CommandId, ComparisonOperator, ContainerContentModel, ContainerEntryValue, ContainerId,
    ContentProcessor, Database, ValueForm,
};

/// What to encode or decode.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    Container(ContainerId),
    Command(CommandId),
}

impl Target {
    pub fn lookup(db: &Database, name: &str, is_command: bool) -> Result<Self> {
        if is_command {
            Ok(Self::Command(db.meta_command(name)?))
        } else {
            Ok(Self::Container(db.container(name)?))
        }
    }

    fn command(self) -> Option<CommandId> {
        match self {
            Self::Command(cid) => Some(cid),
            Self::Container(_) => None,
        }
    }
}

/// Parse `NAME=VALUE` assignments into values for the items of `target`.
///
/// Values prefixed with `raw:` are uncalibrated.
pub fn parse_values(db: &Database, target: Target, set: &[String]) -> Result<Vec<ContainerEntryValue>> {
    let rx = Regex::new(r"^\s*([^=\s]+)\s*=\s*(.*?)\s*$").expect("regex to compile");
    let mut values = Vec::with_capacity(set.len());
    for s in set {
        let cap = rx
            .captures(s)
            .ok_or_else(|| anyhow!("invalid assignment '{s}'; expected NAME=VALUE"))?;
        let item = db
            .find_item(target.command(), &cap[1])
            .with_context(|| format!("invalid assignment '{s}'"))?;
        let (value, form) = match cap[2].strip_prefix("raw:") {
            Some(raw) => (raw, ValueForm::Uncalibrated),
            None => (&cap[2], ValueForm::Calibrated),
        };
        values.push(ContainerEntryValue::new(
            db,
            item,
            value,
            ComparisonOperator::Equal,
            form,
        ));
    }
    Ok(values)
}

pub fn encode_target(
    db: &Database,
    target: Target,
    values: &[ContainerEntryValue],
) -> Result<ContainerContentModel> {
    let processor = ContentProcessor::new(db);
    let model = match target {
        Target::Container(cid) => processor.encode_container(cid, values),
        Target::Command(cid) => processor.encode_command(cid, values),
    };
    model.context("encoding")
}

pub fn encode(db: &Database, target: Target, set: &[String], output: Option<&Path>) -> Result<()> {
    let values = parse_values(db, target, set)?;
    let model = encode_target(db, target, &values)?;
    for warning in model.warnings() {
        warn!("{warning}");
    }
    let encoded = model
        .encoded()
        .ok_or_else(|| anyhow!("nothing was encoded"))?;

    match output {
        Some(path) => {
            let mut dest = File::create(path)
                .with_context(|| format!("failed to create output {path:?}"))?;
            dest.write_all(&encoded.to_aligned_bytes())
                .context("writing output")?;
            info!(
                "wrote {} bits of {} to {path:?}",
                model.total_size(),
                model.container_path()
            );
        }
        None => println!("{encoded}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{
        "name": "S",
        "parameter_types": [{"name": "U8", "engineering": {"integer": {}},
            "encoding": {"integer": {"size_in_bits": 8}}}],
        "parameters": [{"name": "A", "type_ref": "U8"}, {"name": "B", "type_ref": "U8"}],
        "containers": [{"name": "C", "entries": [{"parameter_ref": "A"}, {"parameter_ref": "B"}]}]
    }"#;

    #[test]
    fn assignments() {
        let db = Database::from_json_str(MODEL).unwrap();
        let target = Target::lookup(&db, "C", false).unwrap();
        let values = parse_values(
            &db,
            target,
            &["A=7".to_string(), " B = raw:0x10 ".to_string()],
        )
        .unwrap();
        assert_eq!(values[0].to_string(), "A==7{cal}");
        assert_eq!(values[1].to_string(), "B==0x10{uncal}");

        let model = encode_target(&db, target, &values).unwrap();
        assert_eq!(model.encoded().unwrap().to_hex(), "0x0710");

        assert!(parse_values(&db, target, &["A".to_string()]).is_err());
        assert!(parse_values(&db, target, &["Z=1".to_string()]).is_err());
    }
}
