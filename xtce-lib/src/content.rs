//! Container content processing.
//!
//! A [ContentProcessor] walks a container's inheritance chain root first, evaluating include
//! conditions and repeat counts against values seen earlier in the same pass, and lays out
//! every entry at its bit offset. The same walk is used to describe a container from a set of
//! assumed values, decode it from a bitstream, or encode it from values.
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

use crate::{
    database::{CommandId, ContainerId, Count, EngType, Entry, EntryTarget, TypeId},
    model::LocationReference,
    ComparisonOperator, ContainerEntryValue, Database, DecodedValue, Error, ItemCodec, ItemId,
    RawBits, Result, Value, ValueForm,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Parameter,
    Argument,
    Constant,
    Container,
}

/// One laid out entry of a processed container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentEntry {
    pub kind: EntryKind,
    /// Item name; aggregate members are `NAME.member` and array elements `NAME[i]`.
    pub name: String,
    pub path: String,
    #[serde(skip)]
    pub item: Option<ItemId>,
    #[serde(skip)]
    pub container: Option<ContainerId>,
    pub size_in_bits: usize,
    /// Offset from the start of the container. `None` when not in use.
    pub start_bit: Option<usize>,
    pub value: Option<DecodedValue>,
    pub initial_value: Option<String>,
    /// Include condition, e.g., `FLAG==1{cal} AND MODE!=2{cal}`. Empty if unconditional.
    pub condition: String,
    /// `Repeat i of N`, or the count reference when the count could not be determined.
    pub repeat: Option<String>,
    pub in_use: bool,
    /// Nesting level; entries of nested containers and aggregate members are one deeper.
    pub depth: usize,
}

impl ContentEntry {
    fn new(kind: EntryKind, name: &str, path: &str, depth: usize) -> Self {
        ContentEntry {
            kind,
            name: name.to_string(),
            path: path.to_string(),
            item: None,
            container: None,
            size_in_bits: 0,
            start_bit: None,
            value: None,
            initial_value: None,
            condition: String::new(),
            repeat: None,
            in_use: false,
            depth,
        }
    }

    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }
}

/// Options for [ContentProcessor::process_container].
///
/// # Example
/// ```
/// use xtce::{ProcessOptions, RawBits};
///
/// let options = ProcessOptions::builder()
///     .show_all_conditionals(true)
///     .bits(RawBits::from_hex("0x0102").unwrap())
///     .build();
/// assert!(options.values.is_empty());
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct ProcessOptions {
    /// List entries whose include condition does not hold, marked as not in use.
    #[builder(default)]
    pub show_all_conditionals: bool,
    /// Values assumed for items, e.g., to describe a container without data.
    #[builder(default)]
    pub values: Vec<ContainerEntryValue>,
    /// Data to decode.
    #[builder(default, setter(strip_option))]
    pub bits: Option<RawBits>,
}

/// Result of processing a container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerContentModel {
    container: ContainerId,
    container_path: String,
    entries: Vec<ContentEntry>,
    total_size: usize,
    warnings: Vec<String>,
    valid: bool,
    #[serde(skip)]
    encoded: Option<RawBits>,
}

impl ContainerContentModel {
    /// The processed container. For stream processing this is the identified container.
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.container
    }

    #[must_use]
    pub fn container_path(&self) -> &str {
        &self.container_path
    }

    #[must_use]
    pub fn content_list(&self) -> &[ContentEntry] {
        &self.entries
    }

    /// Furthest extent of in-use entries from the container start.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// False if the data ended before all in-use entries were decoded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Encoded container bits, only set by the encode operations.
    #[must_use]
    pub fn encoded(&self) -> Option<&RawBits> {
        self.encoded.as_ref()
    }

    /// First in-use entry with `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ContentEntry> {
        self.entries.iter().find(|e| e.in_use && e.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Describe,
    Decode,
    Encode,
}

struct Restriction<'db> {
    criteria: &'db ContainerEntryValue,
    container: &'db str,
    checked: bool,
}

/// State for a single walk over a container.
struct Pass<'db, 'a> {
    db: &'db Database,
    mode: Mode,
    bits: Option<&'a RawBits>,
    show_all: bool,
    checking_only: bool,
    /// Values to encode, or to assume when describing.
    sources: BTreeMap<ItemId, (String, ValueForm)>,
    values: HashMap<ItemId, DecodedValue>,
    restrictions: Vec<Restriction<'db>>,
    entries: Vec<ContentEntry>,
    warnings: Vec<String>,
    output: RawBits,
    cursor: usize,
    extent: usize,
    truncated: bool,
    incompatible: bool,
    stack: Vec<ContainerId>,
}

/// Most instances a repeat or array expands to when there is no data to limit it.
const MAX_EXPANSION: u64 = 1 << 16;

fn offset(base: usize, delta: i64) -> usize {
    if delta.is_negative() {
        base.saturating_sub(delta.unsigned_abs() as usize)
    } else {
        base + delta as usize
    }
}

fn describe_count(count: &Count) -> String {
    match count {
        Count::Fixed(n) => n.to_string(),
        Count::Dynamic(dv) => dv.describe(),
    }
}

fn binary_value(bits: RawBits) -> DecodedValue {
    DecodedValue {
        raw: bits.clone(),
        uncalibrated: Value::Binary(bits.clone()),
        calibrated: Value::Binary(bits),
    }
}

/// `[i]` for one dimension, `[i][j]` for two, and so on, row major.
fn array_index(mut index: u64, dims: &[u64]) -> String {
    let mut parts = Vec::with_capacity(dims.len());
    for dim in dims.iter().rev() {
        parts.push(index % dim);
        index /= dim;
    }
    parts.iter().rev().map(|i| format!("[{i}]")).collect()
}

impl<'db, 'a> Pass<'db, 'a> {
    fn new(db: &'db Database, mode: Mode, bits: Option<&'a RawBits>) -> Self {
        Pass {
            db,
            mode,
            bits,
            show_all: false,
            checking_only: false,
            sources: BTreeMap::default(),
            values: HashMap::default(),
            restrictions: Vec::default(),
            entries: Vec::default(),
            warnings: Vec::default(),
            output: RawBits::new(),
            cursor: 0,
            extent: 0,
            truncated: false,
            incompatible: false,
            stack: Vec::default(),
        }
    }

    /// Collect restrictions of the container chain and seed assumed values.
    fn prepare(&mut self, container: ContainerId, values: &[ContainerEntryValue]) -> Result<()> {
        let db = self.db;
        for cid in &db.container_by_id(container).chain {
            let c = db.container_by_id(*cid);
            for criteria in &c.restrictions {
                self.restrictions.push(Restriction {
                    criteria,
                    container: &c.path,
                    checked: false,
                });
                if self.mode != Mode::Decode && criteria.operator() == ComparisonOperator::Equal {
                    if let Some(item) = criteria.item() {
                        self.sources
                            .insert(item, (criteria.value().to_string(), criteria.form()));
                    }
                }
            }
        }
        for v in values {
            if let Some(item) = v.item() {
                self.sources.insert(item, (v.value().to_string(), v.form()));
            }
        }
        let seeds: Vec<(ItemId, String, ValueForm)> = self
            .sources
            .iter()
            .map(|(item, (value, form))| (*item, value.clone(), *form))
            .collect();
        for (item, value, form) in seeds {
            let codec = ItemCodec::new(db, item);
            if !codec.is_valid() {
                continue;
            }
            // warnings are reported when the item is placed
            let raw = codec.encode(&value, form, &self.values)?.value;
            let decoded = codec.decode(&raw, &self.values)?.value;
            self.values.insert(item, decoded);
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.checking_only
            && (self.incompatible
                || self.truncated
                || (!self.restrictions.is_empty() && self.restrictions.iter().all(|r| r.checked)))
    }

    /// Name of `target` and the fewest bits one instance of it takes.
    fn extent_of(&self, target: &'db EntryTarget) -> (&'db str, usize) {
        let db = self.db;
        match target {
            EntryTarget::Item(item) => (
                &db.item(*item).name,
                ItemCodec::new(db, *item).fixed_size_in_bits().unwrap_or(1),
            ),
            EntryTarget::Container(cid) => (&db.container_by_id(*cid).name, 1),
            EntryTarget::FixedValue { name, value } => (name, value.len()),
        }
    }

    /// Number of instances to lay out for an expansion of `count`, each at least `unit` bits
    /// and separated by `gap` bits. When decoding this is at most one more than the remaining
    /// data holds, so the expansion ends in truncation. Otherwise it is capped at
    /// [MAX_EXPANSION].
    fn limit_count(&mut self, name: &str, count: u64, unit: usize, gap: usize) -> u64 {
        if let (Mode::Decode, Some(bits)) = (self.mode, self.bits) {
            let remaining = bits.len().saturating_sub(self.cursor);
            let fits = (remaining + gap) / (unit.max(1) + gap);
            return count.min(u64::try_from(fits).unwrap_or(u64::MAX).saturating_add(1));
        }
        if count > MAX_EXPANSION {
            self.warnings.push(format!(
                "{name} count of {count} exceeds the limit of {MAX_EXPANSION} entries"
            ));
            return MAX_EXPANSION;
        }
        count
    }

    fn push(&mut self, entry: ContentEntry) -> Option<usize> {
        if self.checking_only {
            return None;
        }
        self.entries.push(entry);
        Some(self.entries.len() - 1)
    }

    fn walk(&mut self, container: ContainerId, depth: usize) -> Result<()> {
        let db = self.db;
        if self.stack.contains(&container) {
            return Err(Error::RecursiveContainer(
                db.container_by_id(container).path.clone(),
            ));
        }
        self.stack.push(container);
        let origin = self.cursor;
        for cid in &db.container_by_id(container).chain {
            for entry in &db.container_by_id(*cid).entries {
                if self.done() {
                    break;
                }
                self.entry(entry, origin, depth)?;
            }
        }
        self.stack.pop();
        Ok(())
    }

    fn satisfied(&self, criteria: &ContainerEntryValue) -> bool {
        match criteria.item() {
            Some(item) => self
                .values
                .get(&item)
                .is_some_and(|v| criteria.is_satisfied_by(v)),
            None => true,
        }
    }

    fn entry(&mut self, entry: &'db Entry, origin: usize, depth: usize) -> Result<()> {
        let condition = entry
            .condition
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ");
        if !entry.condition.iter().all(|c| self.satisfied(c)) {
            if self.show_all {
                let repeat = entry.repeat.as_ref().map(|r| describe_count(&r.count));
                self.push_unused(&entry.target, condition, repeat, depth);
            }
            return Ok(());
        }

        if let Some(location) = &entry.location {
            let base = match location.reference {
                LocationReference::ContainerStart => origin,
                LocationReference::PreviousEntry => self.cursor,
            };
            self.cursor = offset(base, location.location_in_bits);
        }

        let Some(repeat) = &entry.repeat else {
            return self.place(&entry.target, &condition, None, depth);
        };
        let Some(count) = repeat.count.evaluate(&self.values) else {
            self.push_unused(
                &entry.target,
                condition,
                Some(describe_count(&repeat.count)),
                depth,
            );
            return Ok(());
        };
        let (name, unit) = self.extent_of(&entry.target);
        let gap = repeat.offset_size_in_bits as usize;
        let limit = self.limit_count(name, count, unit, gap);
        for i in 0..limit {
            if i > 0 {
                self.cursor += gap;
            }
            self.place(
                &entry.target,
                &condition,
                Some(format!("Repeat {} of {count}", i + 1)),
                depth,
            )?;
            if self.truncated || self.done() {
                break;
            }
        }
        if limit < count && !self.truncated && !self.done() {
            self.truncate(name, self.cursor);
        }
        Ok(())
    }

    fn push_unused(
        &mut self,
        target: &EntryTarget,
        condition: String,
        repeat: Option<String>,
        depth: usize,
    ) {
        let db = self.db;
        let mut entry = match target {
            EntryTarget::Item(item) => {
                let def = db.item(*item);
                let mut e = ContentEntry::new(kind_of(*item), &def.name, &def.path, depth);
                e.item = Some(*item);
                e.initial_value.clone_from(&def.initial_value);
                e.size_in_bits = ItemCodec::new(db, *item)
                    .fixed_size_in_bits()
                    .unwrap_or_default();
                e
            }
            EntryTarget::Container(cid) => {
                let c = db.container_by_id(*cid);
                let mut e = ContentEntry::new(EntryKind::Container, &c.name, &c.path, depth);
                e.container = Some(*cid);
                e
            }
            EntryTarget::FixedValue { name, value } => {
                let mut e = ContentEntry::new(EntryKind::Constant, name, name, depth);
                e.size_in_bits = value.len();
                e
            }
        };
        entry.condition = condition;
        entry.repeat = repeat;
        self.push(entry);
    }

    fn place(
        &mut self,
        target: &'db EntryTarget,
        condition: &str,
        repeat: Option<String>,
        depth: usize,
    ) -> Result<()> {
        let db = self.db;
        match target {
            EntryTarget::Item(item) => {
                let def = db.item(*item);
                let mut entry = ContentEntry::new(kind_of(*item), &def.name, &def.path, depth);
                entry.item = Some(*item);
                entry.initial_value.clone_from(&def.initial_value);
                entry.condition = condition.to_string();
                entry.repeat = repeat;
                self.place_typed(entry, def.type_id)
            }
            EntryTarget::Container(cid) => {
                let c = db.container_by_id(*cid);
                let start = self.cursor;
                let mut entry = ContentEntry::new(EntryKind::Container, &c.name, &c.path, depth);
                entry.container = Some(*cid);
                entry.start_bit = Some(start);
                entry.condition = condition.to_string();
                entry.repeat = repeat;
                entry.in_use = true;
                let idx = self.push(entry);
                self.walk(*cid, depth + 1)?;
                if let Some(idx) = idx {
                    self.entries[idx].size_in_bits = self.cursor.saturating_sub(start);
                }
                Ok(())
            }
            EntryTarget::FixedValue { name, value } => {
                let mut entry = ContentEntry::new(EntryKind::Constant, name, name, depth);
                entry.condition = condition.to_string();
                entry.repeat = repeat;
                self.place_fixed(entry, value);
                Ok(())
            }
        }
    }

    /// Place an item, expanding aggregates into members and arrays into elements.
    fn place_typed(&mut self, mut entry: ContentEntry, type_id: TypeId) -> Result<()> {
        let db = self.db;
        let start = self.cursor;
        let (kind, name, path, depth) = (entry.kind, entry.name.clone(), entry.path.clone(), entry.depth);
        let child = |suffix: &str| {
            let mut e = ContentEntry::new(
                kind,
                &format!("{name}{suffix}"),
                &format!("{path}{suffix}"),
                depth + 1,
            );
            e.in_use = true;
            e
        };

        match &db.item_type(type_id).eng {
            EngType::Aggregate(members) => {
                let children: Vec<(ContentEntry, TypeId)> = members
                    .iter()
                    .map(|m| (child(&format!(".{}", m.name)), m.type_id))
                    .collect();
                entry.start_bit = Some(start);
                entry.in_use = true;
                let idx = self.push(entry);
                for (mut e, tid) in children {
                    e.initial_value.clone_from(&db.item_type(tid).initial_value);
                    self.place_typed(e, tid)?;
                    if self.truncated {
                        break;
                    }
                }
                self.close_parent(idx, start, !members.is_empty());
            }
            EngType::Array {
                element,
                dimensions,
            } => {
                let dims: Option<Vec<u64>> = dimensions
                    .iter()
                    .map(|d| d.evaluate(&self.values))
                    .collect();
                let product = dims.as_ref().map_or(Some(0), |d| {
                    d.iter().try_fold(1u64, |acc, n| acc.checked_mul(*n))
                });
                entry.start_bit = Some(start);
                entry.in_use = true;
                let idx = self.push(entry);
                let count = match product {
                    Some(count) => {
                        let unit = ItemCodec::for_type(db, name.clone(), *element)
                            .fixed_size_in_bits()
                            .unwrap_or(1);
                        self.limit_count(&name, count, unit, 0)
                    }
                    None => {
                        self.warnings.push(format!(
                            "{name} dimensions {:?} overflow the element count",
                            dims.as_deref().unwrap_or_default()
                        ));
                        if self.mode == Mode::Decode {
                            self.truncated = true;
                        }
                        0
                    }
                };
                let dims = dims.unwrap_or_default();
                for i in 0..count {
                    let mut e = child(&array_index(i, &dims));
                    e.initial_value.clone_from(&db.item_type(*element).initial_value);
                    self.place_typed(e, *element)?;
                    if self.truncated {
                        break;
                    }
                }
                self.close_parent(idx, start, count > 0);
            }
            _ => self.place_scalar(entry, type_id)?,
        }
        Ok(())
    }

    fn close_parent(&mut self, idx: Option<usize>, start: usize, in_use: bool) {
        if let Some(idx) = idx {
            let parent = &mut self.entries[idx];
            parent.size_in_bits = self.cursor.saturating_sub(start);
            parent.in_use = in_use;
            if !in_use {
                parent.start_bit = None;
            }
        }
    }

    fn place_scalar(&mut self, mut entry: ContentEntry, type_id: TypeId) -> Result<()> {
        let db = self.db;
        let codec = ItemCodec::for_type(db, entry.name.clone(), type_id);
        if !codec.is_valid() {
            return Err(Error::NoEncoding { item: entry.path });
        }
        let start = self.cursor;
        let (size, value) = match self.mode {
            Mode::Decode => {
                let empty = RawBits::new();
                let bits = self.bits.unwrap_or(&empty);
                let window = codec
                    .measure(bits, start, &self.values)
                    .and_then(|n| bits.slice(start, n));
                match window {
                    Some(window) => {
                        let decoded = codec
                            .decode(&window, &self.values)?
                            .drain_into(&mut self.warnings);
                        (window.len(), Some(decoded))
                    }
                    None => {
                        self.truncate(&entry.name, start);
                        (codec.size_in_bits(&self.values).unwrap_or_default(), None)
                    }
                }
            }
            Mode::Encode => {
                let source = entry
                    .item
                    .and_then(|item| self.sources.get(&item).cloned())
                    .or_else(|| {
                        entry
                            .initial_value
                            .clone()
                            .map(|v| (v, ValueForm::Calibrated))
                    });
                let raw = match source {
                    Some((value, form)) => codec
                        .encode(&value, form, &self.values)?
                        .drain_into(&mut self.warnings),
                    None => RawBits::zeros(codec.size_in_bits(&self.values).unwrap_or_default()),
                };
                self.output.write_at(start, &raw);
                let decoded = codec.decode(&raw, &self.values)?.value;
                (raw.len(), Some(decoded))
            }
            Mode::Describe => {
                let known = entry.item.and_then(|item| self.values.get(&item)).cloned();
                let value = match (known, &entry.initial_value) {
                    (Some(v), _) => Some(v),
                    (None, Some(initial)) => {
                        let raw = codec
                            .encode(initial, ValueForm::Calibrated, &self.values)?
                            .drain_into(&mut self.warnings);
                        Some(codec.decode(&raw, &self.values)?.value)
                    }
                    (None, None) => None,
                };
                let size = codec
                    .size_in_bits(&self.values)
                    .or_else(|| value.as_ref().map(|v| v.raw.len()))
                    .unwrap_or_default();
                (size, value)
            }
        };

        if let (Some(item), Some(value)) = (entry.item, &value) {
            self.values.insert(item, value.clone());
            self.check_restrictions(item, value);
        }
        trace!(entry = %entry.path, start, size, "placed");
        self.cursor = start + size;
        self.extent = self.extent.max(self.cursor);
        entry.size_in_bits = size;
        entry.start_bit = Some(start);
        entry.value = value;
        entry.in_use = true;
        self.push(entry);
        Ok(())
    }

    fn place_fixed(&mut self, mut entry: ContentEntry, expected: &RawBits) {
        let start = self.cursor;
        let size = expected.len();
        entry.value = match self.mode {
            Mode::Decode => match self.bits.and_then(|b| b.slice(start, size)) {
                Some(actual) => {
                    if actual != *expected {
                        self.warnings.push(format!(
                            "{} value {actual} does not match fixed value {expected}",
                            entry.name
                        ));
                    }
                    Some(binary_value(actual))
                }
                None => {
                    self.truncate(&entry.name, start);
                    None
                }
            },
            Mode::Encode => {
                self.output.write_at(start, expected);
                Some(binary_value(expected.clone()))
            }
            Mode::Describe => Some(binary_value(expected.clone())),
        };
        self.cursor = start + size;
        self.extent = self.extent.max(self.cursor);
        entry.size_in_bits = size;
        entry.start_bit = Some(start);
        entry.in_use = true;
        self.push(entry);
    }

    fn truncate(&mut self, name: &str, start: usize) {
        if self.truncated {
            return;
        }
        self.truncated = true;
        let len = self.bits.map_or(0, RawBits::len);
        self.warnings.push(format!(
            "{name} at bit {start} extends past the end of the {len} bit data"
        ));
    }

    fn check_restrictions(&mut self, item: ItemId, actual: &DecodedValue) {
        for r in self
            .restrictions
            .iter_mut()
            .filter(|r| r.criteria.item() == Some(item))
        {
            r.checked = true;
            if r.criteria.is_satisfied_by(actual) {
                continue;
            }
            if self.checking_only {
                self.incompatible = true;
            } else {
                self.warnings.push(restriction_warning(r, actual));
            }
        }
    }

    /// Check restrictions on items that were not part of the walk against assumed values.
    fn finish_restrictions(&mut self) {
        for r in self.restrictions.iter_mut().filter(|r| !r.checked) {
            let Some(actual) = r.criteria.item().and_then(|item| self.values.get(&item)) else {
                if self.checking_only {
                    self.incompatible = true;
                } else if !self.truncated {
                    self.warnings.push(format!(
                        "{} was not decoded to check the container restriction of {}",
                        r.criteria.name(),
                        r.container
                    ));
                }
                continue;
            };
            r.checked = true;
            if !r.criteria.is_satisfied_by(actual) {
                if self.checking_only {
                    self.incompatible = true;
                } else {
                    self.warnings.push(restriction_warning(r, actual));
                }
            }
        }
    }

    fn into_model(mut self, container: ContainerId) -> ContainerContentModel {
        let path = self.db.container_by_id(container).path.clone();
        let encoded = if self.mode == Mode::Encode {
            self.output.resize(self.extent);
            Some(self.output)
        } else {
            None
        };
        debug!(
            container = %path,
            bits = self.extent,
            entries = self.entries.len(),
            warnings = self.warnings.len(),
            "processed container"
        );
        ContainerContentModel {
            container,
            container_path: path,
            entries: self.entries,
            total_size: self.extent,
            warnings: self.warnings,
            valid: !self.truncated,
            encoded,
        }
    }
}

fn kind_of(item: ItemId) -> EntryKind {
    match item {
        ItemId::Parameter(_) => EntryKind::Parameter,
        ItemId::Argument(_) => EntryKind::Argument,
    }
}

fn restriction_warning(r: &Restriction, actual: &DecodedValue) -> String {
    let criteria = r.criteria;
    let expected = if criteria.operator() == ComparisonOperator::Equal {
        criteria.value().to_string()
    } else {
        format!("{}{}", criteria.operator(), criteria.value())
    };
    format!(
        "{} {} versus {expected} due to container restriction of {}",
        criteria.name(),
        actual.for_form(criteria.form()),
        r.container
    )
}

/// Lays out, decodes, and encodes containers of a [Database].
///
/// # Example
/// ```
/// use xtce::{ContentProcessor, Database, ProcessOptions, RawBits};
///
/// let db = Database::from_json_str(r#"{
///     "name": "S",
///     "parameter_types": [{"name": "U8", "engineering": {"integer": {}},
///         "encoding": {"integer": {"size_in_bits": 8}}}],
///     "parameters": [{"name": "A", "type_ref": "U8"}, {"name": "B", "type_ref": "U8"}],
///     "containers": [{"name": "C", "entries": [{"parameter_ref": "A"}, {"parameter_ref": "B"}]}]
/// }"#).unwrap();
/// let processor = ContentProcessor::new(&db);
/// let options = ProcessOptions::builder()
///     .bits(RawBits::from_hex("0x0a0b").unwrap())
///     .build();
/// let model = processor
///     .process_container(db.container("C").unwrap(), &options)
///     .unwrap();
///
/// assert_eq!(model.total_size(), 16);
/// assert_eq!(model.entry("B").unwrap().start_bit, Some(8));
/// assert_eq!(model.entry("B").unwrap().value.as_ref().unwrap().to_string(), "11");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ContentProcessor<'db> {
    db: &'db Database,
}

impl<'db> ContentProcessor<'db> {
    #[must_use]
    pub fn new(db: &'db Database) -> Self {
        ContentProcessor { db }
    }

    #[must_use]
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Lay out `container`, decoding `options.bits` if provided. Without bits entries take
    /// values from `options.values`, the container restrictions, or item initial values.
    ///
    /// # Errors
    /// Structural problems only, e.g., [Error::NoEncoding] for an entry whose type has no
    /// usable encoding or [Error::RecursiveContainer]. Data anomalies are warnings on the
    /// returned model.
    pub fn process_container(
        &self,
        container: ContainerId,
        options: &ProcessOptions,
    ) -> Result<ContainerContentModel> {
        let mode = if options.bits.is_some() {
            Mode::Decode
        } else {
            Mode::Describe
        };
        let mut pass = Pass::new(self.db, mode, options.bits.as_ref());
        pass.show_all = options.show_all_conditionals;
        pass.prepare(container, &options.values)?;
        pass.walk(container, 0)?;
        pass.finish_restrictions();
        Ok(pass.into_model(container))
    }

    /// Lay out the command container of `command`.
    ///
    /// # Errors
    /// See [ContentProcessor::process_container].
    pub fn process_command(
        &self,
        command: CommandId,
        options: &ProcessOptions,
    ) -> Result<ContainerContentModel> {
        self.process_container(self.db.meta_command_by_id(command).container, options)
    }

    /// Whether the restrictions of `container` and its ancestors hold for `bits`.
    ///
    /// Only enough of `bits` is decoded to check the restrictions and no entries are
    /// collected. A restriction on an item that cannot be decoded from `bits` does not hold.
    ///
    /// # Errors
    /// See [ContentProcessor::process_container].
    pub fn is_processing_compatible(&self, container: ContainerId, bits: &RawBits) -> Result<bool> {
        let mut pass = Pass::new(self.db, Mode::Decode, Some(bits));
        pass.checking_only = true;
        pass.prepare(container, &[])?;
        pass.walk(container, 0)?;
        pass.finish_restrictions();
        Ok(!pass.incompatible)
    }

    /// Encode `container` from `values`. Items without a value use the container
    /// restrictions, their initial value, or all zeros, in that order of preference.
    ///
    /// The encoded bits are available from [ContainerContentModel::encoded].
    ///
    /// # Errors
    /// See [ContentProcessor::process_container].
    pub fn encode_container(
        &self,
        container: ContainerId,
        values: &[ContainerEntryValue],
    ) -> Result<ContainerContentModel> {
        let mut pass = Pass::new(self.db, Mode::Encode, None);
        pass.prepare(container, values)?;
        pass.walk(container, 0)?;
        pass.finish_restrictions();
        Ok(pass.into_model(container))
    }

    /// Encode the command container of `command`. Argument assignments of the command act
    /// as values for the arguments of its base commands.
    ///
    /// # Errors
    /// See [ContentProcessor::process_container].
    pub fn encode_command(
        &self,
        command: CommandId,
        values: &[ContainerEntryValue],
    ) -> Result<ContainerContentModel> {
        self.encode_container(self.db.meta_command_by_id(command).container, values)
    }
}
