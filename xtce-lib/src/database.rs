//! Resolved, index based view of a model document.
//!
//! All path references in a [SpaceSystem] document are resolved once, when the database is
//! created, into typed ids. Processing code only ever works with ids and never looks up a
//! string reference per packet.
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, Read},
    path::Path,
    str::FromStr,
};

use derive_more::From;
use hifitime::Epoch;
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    calibration::{Calibration, Calibrator, ContextCalibrator},
    error::ObjectKind,
    model::{
        BaseContainerDef, BinarySizeDef, ByteOrder, Charset, ComparisonDef, DataType,
        DynamicValueDef, EngineeringType, EntryDef, EnumValue, IntegerEncoding, IntegerValueDef,
        ItemDef, LocationReference, MetaCommandDef, RawEncoding, SpaceSystem, StringSizeDef,
        ValidRange,
    },
    timecode, ComparisonOperator, ContainerEntryValue, Error, RawBits, Result, ValueForm,
    ValueLookup,
};

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(usize);

        impl $name {
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

id_type!(ParameterId, "Index of a parameter in a [Database].");
id_type!(ArgumentId, "Index of a meta command argument in a [Database].");
id_type!(TypeId, "Index of a parameter or argument type in a [Database].");
id_type!(ContainerId, "Index of a container in a [Database].");
id_type!(CommandId, "Index of a meta command in a [Database].");
id_type!(StreamId, "Index of a stream in a [Database].");

/// Identity of a parameter or argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, From)]
pub enum ItemId {
    Parameter(ParameterId),
    Argument(ArgumentId),
}

#[derive(Debug, Clone)]
pub struct SpaceSystemInfo {
    pub name: String,
    pub path: String,
    pub parent: Option<usize>,
    pub description: Option<String>,
}

/// A parameter or argument.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub path: String,
    pub type_id: TypeId,
    pub initial_value: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItemType {
    pub name: String,
    pub path: String,
    pub eng: EngType,
    pub encoding: Option<Encoding>,
    pub valid_range: Option<ValidRange>,
    pub initial_value: Option<String>,
    pub units: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub type_id: TypeId,
}

/// Engineering (calibrated) representation of a type.
#[derive(Debug, Clone)]
pub enum EngType {
    Integer { signed: bool, size: u32 },
    Float { size: u32 },
    Boolean { zero_string: String, one_string: String },
    Enumeration(Vec<EnumValue>),
    String,
    Binary,
    AbsoluteTime { epoch: Epoch, scale: f64, offset: f64 },
    Aggregate(Vec<Member>),
    Array { element: TypeId, dimensions: Vec<Count> },
}

impl EngType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            EngType::Integer { .. } => "Integer",
            EngType::Float { .. } => "Float",
            EngType::Boolean { .. } => "Boolean",
            EngType::Enumeration(_) => "Enumeration",
            EngType::String => "String",
            EngType::Binary => "Binary",
            EngType::AbsoluteTime { .. } => "AbsoluteTime",
            EngType::Aggregate(_) => "Aggregate",
            EngType::Array { .. } => "Array",
        }
    }
}

/// Raw (on the wire) representation of a type.
#[derive(Debug, Clone)]
pub enum Encoding {
    Integer {
        size: u32,
        kind: IntegerEncoding,
        byte_order: ByteOrder,
        calibration: Calibration,
    },
    Float {
        size: u32,
        byte_order: ByteOrder,
        calibration: Calibration,
    },
    String {
        charset: Charset,
        size: StringSize,
    },
    Binary {
        size: BinarySize,
    },
    Timecode(timecode::Format),
}

#[derive(Debug, Clone)]
pub enum StringSize {
    Fixed(u64),
    Terminated { terminator: Vec<u8>, max: Option<u64> },
    /// Number of bits in the leading byte count tag.
    LeadingSize(u32),
    Dynamic(DynamicValue),
}

#[derive(Debug, Clone)]
pub enum BinarySize {
    Fixed(u64),
    Dynamic(DynamicValue),
}

/// An integer that is either fixed in the model or taken from another item.
#[derive(Debug, Clone)]
pub enum Count {
    Fixed(u64),
    Dynamic(DynamicValue),
}

impl Count {
    /// `None` if dynamic and the referenced value is not known.
    #[must_use]
    pub fn evaluate(&self, values: &dyn ValueLookup) -> Option<u64> {
        match self {
            Count::Fixed(n) => Some(*n),
            Count::Dynamic(dv) => dv.evaluate(values),
        }
    }
}

/// `value * slope + intercept` of another item's value.
#[derive(Debug, Clone)]
pub struct DynamicValue {
    pub item: ItemId,
    pub name: String,
    pub form: ValueForm,
    pub slope: f64,
    pub intercept: f64,
}

impl DynamicValue {
    #[must_use]
    pub fn evaluate(&self, values: &dyn ValueLookup) -> Option<u64> {
        let value = values.lookup(self.item)?.for_form(self.form).as_f64()?;
        let v = (value * self.slope + self.intercept).round();
        Some(if v.is_sign_negative() { 0 } else { v as u64 })
    }

    /// E.g., `==TC_Parameter_Count{cal}`
    #[must_use]
    pub fn describe(&self) -> String {
        format!("=={}{}", self.name, self.form)
    }
}

/// A container with its base and restrictions resolved.
#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    pub path: String,
    pub is_abstract: bool,
    pub description: Option<String>,
    pub base: Option<ContainerId>,
    /// Root first, ending with this container.
    pub chain: Vec<ContainerId>,
    /// Criteria the values of items in base containers must meet.
    pub restrictions: Vec<ContainerEntryValue>,
    pub entries: Vec<Entry>,
    /// Set when this is the command container of a meta command.
    pub command: Option<CommandId>,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub target: EntryTarget,
    /// Conjunction that must hold for the entry to be included.
    pub condition: Vec<ContainerEntryValue>,
    pub repeat: Option<Repeat>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone)]
pub enum EntryTarget {
    Item(ItemId),
    Container(ContainerId),
    FixedValue { name: String, value: RawBits },
}

#[derive(Debug, Clone)]
pub struct Repeat {
    pub count: Count,
    pub offset_size_in_bits: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub reference: LocationReference,
    pub location_in_bits: i64,
}

#[derive(Debug, Clone)]
pub struct MetaCommand {
    pub name: String,
    pub path: String,
    pub is_abstract: bool,
    pub description: Option<String>,
    pub base: Option<CommandId>,
    pub arguments: Vec<ArgumentId>,
    /// Values this command assigns to arguments of its base commands.
    pub assignments: Vec<ContainerEntryValue>,
    pub container: ContainerId,
}

#[derive(Debug, Clone)]
pub struct Stream {
    pub name: String,
    pub path: String,
    pub root: ContainerId,
    /// Concrete containers derived from `root`, most derived first.
    pub candidates: Vec<ContainerId>,
}

/// A fully resolved model.
#[derive(Debug, Clone, Default)]
pub struct Database {
    systems: Vec<SpaceSystemInfo>,
    parameters: Vec<Item>,
    arguments: Vec<Item>,
    types: Vec<ItemType>,
    containers: Vec<Container>,
    commands: Vec<MetaCommand>,
    streams: Vec<Stream>,

    parameter_paths: HashMap<String, ParameterId>,
    container_paths: HashMap<String, ContainerId>,
    command_paths: HashMap<String, CommandId>,
    stream_paths: HashMap<String, StreamId>,
}

impl Database {
    /// Resolve a model document.
    ///
    /// # Errors
    /// If any reference does not resolve, or the model is otherwise inconsistent, e.g.,
    /// contains an inheritance cycle.
    pub fn new(root: &SpaceSystem) -> Result<Self> {
        let db = Loader::collect(root)?.resolve()?;
        debug!(
            root = %root.name,
            parameters = db.parameters.len(),
            containers = db.containers.len(),
            commands = db.commands.len(),
            streams = db.streams.len(),
            "loaded database"
        );
        Ok(db)
    }

    /// # Errors
    /// If the document is not valid JSON, or see [Database::new].
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let root: SpaceSystem = serde_json::from_reader(reader)?;
        Self::new(&root)
    }

    /// # Errors
    /// See [Database::from_json_reader].
    pub fn from_json_str(s: &str) -> Result<Self> {
        let root: SpaceSystem = serde_json::from_str(s)?;
        Self::new(&root)
    }

    /// # Errors
    /// If the file cannot be read, or see [Database::from_json_reader].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_json_reader(BufReader::new(file))
    }

    /// Look up a parameter by full path or by name, where a name may also be a trailing
    /// portion of a path, e.g., `Sub/NAME`.
    ///
    /// # Errors
    /// [Error::NotFound] if nothing matches, [Error::Ambiguous] if more than one parameter
    /// matches.
    pub fn parameter(&self, query: &str) -> Result<ParameterId> {
        find(&self.parameter_paths, ObjectKind::Parameter, query)
    }

    /// Look up a sequence container. Command containers are not included, use
    /// [Database::meta_command].
    ///
    /// # Errors
    /// See [Database::parameter].
    pub fn container(&self, query: &str) -> Result<ContainerId> {
        find(&self.container_paths, ObjectKind::Container, query)
    }

    /// # Errors
    /// See [Database::parameter].
    pub fn meta_command(&self, query: &str) -> Result<CommandId> {
        find(&self.command_paths, ObjectKind::MetaCommand, query)
    }

    /// # Errors
    /// See [Database::parameter].
    pub fn stream(&self, query: &str) -> Result<StreamId> {
        find(&self.stream_paths, ObjectKind::Stream, query)
    }

    /// Look up an argument of a meta command, or any of its base commands, by name.
    ///
    /// # Errors
    /// [Error::NotFound] if no such argument.
    pub fn argument(&self, command: CommandId, name: &str) -> Result<ArgumentId> {
        let mut cur = Some(command);
        while let Some(cid) = cur {
            let cmd = self.meta_command_by_id(cid);
            if let Some(aid) = cmd
                .arguments
                .iter()
                .find(|a| self.arguments[a.0].name == name)
            {
                return Ok(*aid);
            }
            cur = cmd.base;
        }
        Err(Error::NotFound {
            kind: ObjectKind::Argument,
            query: format!("{}/{name}", self.meta_command_by_id(command).path),
        })
    }

    /// Look up a parameter or argument as the item of a value to set. Plain names and paths
    /// are parameters unless `command` has an argument with that name.
    ///
    /// # Errors
    /// If no item matches.
    pub fn find_item(&self, command: Option<CommandId>, query: &str) -> Result<ItemId> {
        if let Some(cid) = command {
            if let Ok(aid) = self.argument(cid, query) {
                return Ok(aid.into());
            }
        }
        self.parameter(query).map(ItemId::from)
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> &Item {
        match id {
            ItemId::Parameter(p) => &self.parameters[p.0],
            ItemId::Argument(a) => &self.arguments[a.0],
        }
    }

    #[must_use]
    pub fn item_type(&self, id: TypeId) -> &ItemType {
        &self.types[id.0]
    }

    #[must_use]
    pub fn type_of(&self, id: ItemId) -> &ItemType {
        self.item_type(self.item(id).type_id)
    }

    #[must_use]
    pub fn container_by_id(&self, id: ContainerId) -> &Container {
        &self.containers[id.0]
    }

    #[must_use]
    pub fn meta_command_by_id(&self, id: CommandId) -> &MetaCommand {
        &self.commands[id.0]
    }

    #[must_use]
    pub fn stream_by_id(&self, id: StreamId) -> &Stream {
        &self.streams[id.0]
    }

    pub fn space_systems(&self) -> impl Iterator<Item = &SpaceSystemInfo> {
        self.systems.iter()
    }

    pub fn parameters(&self) -> impl Iterator<Item = (ParameterId, &Item)> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (ParameterId(i), p))
    }

    /// All containers, including command containers.
    pub fn containers(&self) -> impl Iterator<Item = (ContainerId, &Container)> {
        self.containers
            .iter()
            .enumerate()
            .map(|(i, c)| (ContainerId(i), c))
    }

    pub fn meta_commands(&self) -> impl Iterator<Item = (CommandId, &MetaCommand)> {
        self.commands
            .iter()
            .enumerate()
            .map(|(i, c)| (CommandId(i), c))
    }

    pub fn streams(&self) -> impl Iterator<Item = (StreamId, &Stream)> {
        self.streams
            .iter()
            .enumerate()
            .map(|(i, s)| (StreamId(i), s))
    }

    /// Whether `ancestor` is `container` or in its inheritance chain.
    #[must_use]
    pub fn inherits_from(&self, container: ContainerId, ancestor: ContainerId) -> bool {
        self.containers[container.0].chain.contains(&ancestor)
    }
}

fn find<T: Copy>(map: &HashMap<String, T>, kind: ObjectKind, query: &str) -> Result<T> {
    if query.starts_with('/') {
        return map.get(query).copied().ok_or_else(|| Error::NotFound {
            kind,
            query: query.to_string(),
        });
    }
    let suffix = format!("/{query}");
    let mut matches: Vec<(&String, T)> = map
        .iter()
        .filter(|(path, _)| path.ends_with(&suffix))
        .map(|(path, id)| (path, *id))
        .collect();
    match matches.len() {
        0 => Err(Error::NotFound {
            kind,
            query: query.to_string(),
        }),
        1 => Ok(matches[0].1),
        _ => {
            matches.sort_by(|a, b| a.0.cmp(b.0));
            Err(Error::Ambiguous {
                kind,
                query: query.to_string(),
                matches: matches.into_iter().map(|(p, _)| p.clone()).collect(),
            })
        }
    }
}

/// Collapse `.` and `..` segments of an absolute path. `None` if `..` goes above the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::default();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

/// Where a reference is being resolved from.
#[derive(Clone, Copy)]
struct Scope<'s> {
    system: usize,
    command: Option<CommandId>,
    from: &'s str,
}

struct ContainerSource<'a> {
    system: usize,
    name: String,
    path: String,
    is_abstract: bool,
    description: Option<String>,
    base: Option<&'a BaseContainerDef>,
    entries: &'a [EntryDef],
    command: Option<CommandId>,
}

/// Two phase model loading. First every named object is given an id and a path, then all
/// references are resolved.
#[derive(Default)]
struct Loader<'a> {
    systems: Vec<SpaceSystemInfo>,
    types: Vec<(usize, String, &'a DataType)>,
    parameters: Vec<(usize, String, &'a ItemDef)>,
    arguments: Vec<(CommandId, String, &'a ItemDef)>,
    containers: Vec<ContainerSource<'a>>,
    commands: Vec<(usize, String, &'a MetaCommandDef)>,
    command_args: Vec<Vec<ArgumentId>>,
    streams: Vec<(usize, String, &'a str)>,

    parameter_type_paths: HashMap<String, TypeId>,
    argument_type_paths: HashMap<String, TypeId>,
    parameter_paths: HashMap<String, ParameterId>,
    container_paths: HashMap<String, ContainerId>,
    command_paths: HashMap<String, CommandId>,
    stream_paths: HashMap<String, StreamId>,
}

fn insert_unique<T>(
    map: &mut HashMap<String, T>,
    kind: ObjectKind,
    path: &str,
    id: T,
) -> Result<()> {
    if map.insert(path.to_string(), id).is_some() {
        return Err(Error::Model(format!("duplicate {kind} {path}")));
    }
    Ok(())
}

impl<'a> Loader<'a> {
    fn collect(root: &'a SpaceSystem) -> Result<Self> {
        let mut loader = Loader::default();
        loader.collect_system(root, None)?;
        // Command containers are allocated after all sequence containers so ids of
        // sequence containers follow declaration order.
        for (idx, (system, path, def)) in loader.commands.iter().enumerate() {
            let def: &'a MetaCommandDef = def;
            let cc = def.command_container.as_ref();
            loader.containers.push(ContainerSource {
                system: *system,
                name: cc
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| def.name.clone()),
                path: path.clone(),
                is_abstract: def.is_abstract,
                description: def.short_description.clone(),
                base: cc.and_then(|c| c.base.as_ref()),
                entries: cc.map(|c| c.entries.as_slice()).unwrap_or_default(),
                command: Some(CommandId(idx)),
            });
        }
        Ok(loader)
    }

    fn collect_system(&mut self, ss: &'a SpaceSystem, parent: Option<usize>) -> Result<()> {
        if ss.name.is_empty() || ss.name.contains('/') {
            return Err(Error::Model(format!(
                "invalid space system name '{}'",
                ss.name
            )));
        }
        let path = match parent {
            Some(p) => format!("{}/{}", self.systems[p].path, ss.name),
            None => format!("/{}", ss.name),
        };
        let system = self.systems.len();
        self.systems.push(SpaceSystemInfo {
            name: ss.name.clone(),
            path: path.clone(),
            parent,
            description: ss.short_description.clone(),
        });

        for (defs, paths) in [
            (&ss.parameter_types, &mut self.parameter_type_paths),
            (&ss.argument_types, &mut self.argument_type_paths),
        ] {
            for def in defs {
                let tpath = format!("{path}/{}", def.name);
                insert_unique(paths, ObjectKind::Type, &tpath, TypeId(self.types.len()))?;
                self.types.push((system, tpath, def));
            }
        }
        for def in &ss.parameters {
            let ppath = format!("{path}/{}", def.name);
            let id = ParameterId(self.parameters.len());
            insert_unique(&mut self.parameter_paths, ObjectKind::Parameter, &ppath, id)?;
            self.parameters.push((system, ppath, def));
        }
        for def in &ss.containers {
            let cpath = format!("{path}/{}", def.name);
            let id = ContainerId(self.containers.len());
            insert_unique(&mut self.container_paths, ObjectKind::Container, &cpath, id)?;
            self.containers.push(ContainerSource {
                system,
                name: def.name.clone(),
                path: cpath,
                is_abstract: def.is_abstract,
                description: def.short_description.clone(),
                base: def.base.as_ref(),
                entries: &def.entries,
                command: None,
            });
        }
        for def in &ss.meta_commands {
            let cpath = format!("{path}/{}", def.name);
            let id = CommandId(self.commands.len());
            insert_unique(&mut self.command_paths, ObjectKind::MetaCommand, &cpath, id)?;
            let mut args = Vec::with_capacity(def.arguments.len());
            for arg in &def.arguments {
                if def.arguments.iter().filter(|a| a.name == arg.name).count() > 1 {
                    return Err(Error::Model(format!(
                        "duplicate argument {} in {cpath}",
                        arg.name
                    )));
                }
                args.push(ArgumentId(self.arguments.len()));
                self.arguments
                    .push((id, format!("{cpath}/{}", arg.name), arg));
            }
            self.command_args.push(args);
            self.commands.push((system, cpath, def));
        }
        for def in &ss.streams {
            let spath = format!("{path}/{}", def.name);
            let id = StreamId(self.streams.len());
            insert_unique(&mut self.stream_paths, ObjectKind::Stream, &spath, id)?;
            self.streams.push((system, spath, &def.container_ref));
        }
        for child in &ss.space_systems {
            self.collect_system(child, Some(system))?;
        }
        Ok(())
    }

    /// Resolve `reference` in `map` from `system`.
    fn lookup<T: Copy>(&self, map: &HashMap<String, T>, system: usize, reference: &str) -> Option<T> {
        if reference.starts_with('/') {
            return map.get(&normalize(reference)?).copied();
        }
        if reference.contains('/') {
            let joined = format!("{}/{reference}", self.systems[system].path);
            return map.get(&normalize(&joined)?).copied();
        }
        let mut cur = Some(system);
        while let Some(s) = cur {
            if let Some(id) = map.get(&format!("{}/{reference}", self.systems[s].path)) {
                return Some(*id);
            }
            cur = self.systems[s].parent;
        }
        None
    }

    fn resolve_ref<T: Copy>(
        &self,
        map: &HashMap<String, T>,
        kind: ObjectKind,
        scope: Scope,
        reference: &str,
    ) -> Result<T> {
        self.lookup(map, scope.system, reference)
            .ok_or_else(|| Error::UnresolvedReference {
                from: scope.from.to_string(),
                kind,
                reference: reference.to_string(),
            })
    }

    fn item_name_path(&self, item: ItemId) -> (&str, &str) {
        match item {
            ItemId::Parameter(p) => {
                let (_, path, def) = &self.parameters[p.0];
                (&def.name, path)
            }
            ItemId::Argument(a) => {
                let (_, path, def) = &self.arguments[a.0];
                (&def.name, path)
            }
        }
    }

    /// Argument `name` of `command` or any of its bases.
    fn command_argument(
        &self,
        bases: &[Option<CommandId>],
        command: CommandId,
        name: &str,
    ) -> Option<ArgumentId> {
        let mut cur = Some(command);
        while let Some(cid) = cur {
            if let Some(aid) = self.command_args[cid.0]
                .iter()
                .find(|a| self.arguments[a.0].2.name == name)
            {
                return Some(*aid);
            }
            cur = bases[cid.0];
        }
        None
    }

    /// Resolve the item of a comparison or dynamic value.
    fn resolve_item(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        parameter_ref: Option<&String>,
        argument_ref: Option<&String>,
    ) -> Result<ItemId> {
        match (parameter_ref, argument_ref) {
            (Some(p), None) => self
                .resolve_ref(&self.parameter_paths, ObjectKind::Parameter, scope, p)
                .map(ItemId::from),
            (None, Some(a)) => {
                let command = scope.command.ok_or_else(|| {
                    Error::Model(format!(
                        "{} references argument {a} outside of a meta command",
                        scope.from
                    ))
                })?;
                self.command_argument(bases, command, a)
                    .map(ItemId::from)
                    .ok_or_else(|| Error::UnresolvedReference {
                        from: scope.from.to_string(),
                        kind: ObjectKind::Argument,
                        reference: a.clone(),
                    })
            }
            _ => Err(Error::Model(format!(
                "{} must reference exactly one parameter or argument",
                scope.from
            ))),
        }
    }

    fn comparison(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        def: &ComparisonDef,
    ) -> Result<ContainerEntryValue> {
        let item = self.resolve_item(
            bases,
            scope,
            def.parameter_ref.as_ref(),
            def.argument_ref.as_ref(),
        )?;
        let (name, path) = self.item_name_path(item);
        Ok(ContainerEntryValue::resolved(
            item,
            name,
            path,
            def.value.clone(),
            def.comparison_operator,
            form(def.use_calibrated_value),
        ))
    }

    fn dynamic(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        def: &DynamicValueDef,
    ) -> Result<DynamicValue> {
        let item = self.resolve_item(
            bases,
            scope,
            def.parameter_ref.as_ref(),
            def.argument_ref.as_ref(),
        )?;
        Ok(DynamicValue {
            item,
            name: self.item_name_path(item).0.to_string(),
            form: form(def.use_calibrated_value),
            slope: def.slope,
            intercept: def.intercept,
        })
    }

    fn count(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        def: &IntegerValueDef,
    ) -> Result<Count> {
        Ok(match def {
            IntegerValueDef::Fixed(n) => Count::Fixed(*n),
            IntegerValueDef::Dynamic(d) => Count::Dynamic(self.dynamic(bases, scope, d)?),
        })
    }

    fn resolve(self) -> Result<Database> {
        let bases = self.resolve_command_bases()?;

        let types = self
            .types
            .iter()
            .enumerate()
            .map(|(idx, (system, path, def))| self.resolve_type(&bases, idx, *system, path, def))
            .collect::<Result<Vec<_>>>()?;
        check_type_nesting(&types)?;

        let mut parameters = Vec::with_capacity(self.parameters.len());
        for (system, path, def) in &self.parameters {
            let scope = Scope {
                system: *system,
                command: None,
                from: path,
            };
            parameters.push(self.resolve_item_def(&self.parameter_type_paths, &types, scope, path, def)?);
        }
        let mut arguments = Vec::with_capacity(self.arguments.len());
        for (command, path, def) in &self.arguments {
            let scope = Scope {
                system: self.commands[command.0].0,
                command: Some(*command),
                from: path,
            };
            arguments.push(self.resolve_item_def(&self.argument_type_paths, &types, scope, path, def)?);
        }

        let mut containers = Vec::with_capacity(self.containers.len());
        for src in &self.containers {
            containers.push(self.resolve_container(&bases, src)?);
        }
        for idx in 0..containers.len() {
            containers[idx].chain = container_chain(&containers, ContainerId(idx))?;
        }

        let mut commands = Vec::with_capacity(self.commands.len());
        for (idx, (system, path, def)) in self.commands.iter().enumerate() {
            let command = CommandId(idx);
            let container = ContainerId(
                self.containers
                    .iter()
                    .position(|c| c.command == Some(command))
                    .ok_or_else(|| Error::Model(format!("{path} has no command container")))?,
            );
            let mut assignments = Vec::default();
            if let (Some(base), Some(base_def)) = (bases[idx], def.base.as_ref()) {
                for assignment in &base_def.argument_assignments {
                    let aid = self
                        .command_argument(&bases, base, &assignment.argument_name)
                        .ok_or_else(|| Error::UnresolvedReference {
                            from: path.clone(),
                            kind: ObjectKind::Argument,
                            reference: assignment.argument_name.clone(),
                        })?;
                    let (name, apath) = self.item_name_path(aid.into());
                    assignments.push(ContainerEntryValue::resolved(
                        aid.into(),
                        name,
                        apath,
                        assignment.value.clone(),
                        ComparisonOperator::Equal,
                        ValueForm::Calibrated,
                    ));
                }
            }
            trace!(command = %path, system, ?assignments, "resolved meta command");
            containers[container.0]
                .restrictions
                .extend(assignments.iter().cloned());
            commands.push(MetaCommand {
                name: def.name.clone(),
                path: path.clone(),
                is_abstract: def.is_abstract,
                description: def.short_description.clone(),
                base: bases[idx],
                arguments: self.command_args[idx].clone(),
                assignments,
                container,
            });
        }

        check_restrictions(&containers)?;

        let mut streams = Vec::with_capacity(self.streams.len());
        for (system, path, container_ref) in &self.streams {
            let scope = Scope {
                system: *system,
                command: None,
                from: path,
            };
            let root = self.resolve_ref(
                &self.container_paths,
                ObjectKind::Container,
                scope,
                container_ref,
            )?;
            let mut candidates: Vec<ContainerId> = (0..containers.len())
                .map(ContainerId)
                .filter(|id| {
                    let c = &containers[id.0];
                    !c.is_abstract && c.command.is_none() && c.chain.contains(&root)
                })
                .collect();
            // stable, so declaration order is kept for equal depth
            candidates.sort_by_key(|id| std::cmp::Reverse(containers[id.0].chain.len()));
            streams.push(Stream {
                name: path.rsplit('/').next().unwrap_or_default().to_string(),
                path: path.clone(),
                root,
                candidates,
            });
        }

        Ok(Database {
            systems: self.systems,
            parameters,
            arguments,
            types,
            containers,
            commands,
            streams,
            parameter_paths: self.parameter_paths,
            container_paths: self.container_paths,
            command_paths: self.command_paths,
            stream_paths: self.stream_paths,
        })
    }

    fn resolve_command_bases(&self) -> Result<Vec<Option<CommandId>>> {
        let mut bases = Vec::with_capacity(self.commands.len());
        for (system, path, def) in &self.commands {
            let scope = Scope {
                system: *system,
                command: None,
                from: path,
            };
            bases.push(match &def.base {
                Some(base) => Some(self.resolve_ref(
                    &self.command_paths,
                    ObjectKind::MetaCommand,
                    scope,
                    &base.meta_command_ref,
                )?),
                None => None,
            });
        }
        for (idx, (_, path, _)) in self.commands.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut cur = Some(CommandId(idx));
            while let Some(cid) = cur {
                if !seen.insert(cid) {
                    return Err(Error::InheritanceCycle(path.clone()));
                }
                cur = bases[cid.0];
            }
        }
        Ok(bases)
    }

    fn resolve_item_def(
        &self,
        type_paths: &HashMap<String, TypeId>,
        types: &[ItemType],
        scope: Scope,
        path: &str,
        def: &ItemDef,
    ) -> Result<Item> {
        let type_id = self.resolve_ref(type_paths, ObjectKind::Type, scope, &def.type_ref)?;
        Ok(Item {
            name: def.name.clone(),
            path: path.to_string(),
            type_id,
            initial_value: def
                .initial_value
                .clone()
                .or_else(|| types[type_id.0].initial_value.clone()),
            description: def.short_description.clone(),
        })
    }

    fn resolve_type(
        &self,
        bases: &[Option<CommandId>],
        idx: usize,
        system: usize,
        path: &str,
        def: &DataType,
    ) -> Result<ItemType> {
        let scope = Scope {
            system,
            command: None,
            from: path,
        };
        let type_paths = if self.parameter_type_paths.get(path) == Some(&TypeId(idx)) {
            &self.parameter_type_paths
        } else {
            &self.argument_type_paths
        };

        let eng = match &def.engineering {
            EngineeringType::Integer {
                signed,
                size_in_bits,
            } => EngType::Integer {
                signed: *signed,
                size: *size_in_bits,
            },
            EngineeringType::Float { size_in_bits } => EngType::Float {
                size: *size_in_bits,
            },
            EngineeringType::Boolean {
                zero_string,
                one_string,
            } => EngType::Boolean {
                zero_string: zero_string.clone(),
                one_string: one_string.clone(),
            },
            EngineeringType::Enumeration { values } => EngType::Enumeration(values.clone()),
            EngineeringType::String => EngType::String,
            EngineeringType::Binary => EngType::Binary,
            EngineeringType::AbsoluteTime {
                epoch,
                scale,
                offset,
            } => EngType::AbsoluteTime {
                epoch: parse_epoch(epoch)?,
                scale: *scale,
                offset: *offset,
            },
            EngineeringType::Aggregate { members } => EngType::Aggregate(
                members
                    .iter()
                    .map(|m| {
                        Ok(Member {
                            name: m.name.clone(),
                            type_id: self.resolve_ref(type_paths, ObjectKind::Type, scope, &m.type_ref)?,
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            EngineeringType::Array {
                element_type_ref,
                dimensions,
            } => EngType::Array {
                element: self.resolve_ref(type_paths, ObjectKind::Type, scope, element_type_ref)?,
                dimensions: dimensions
                    .iter()
                    .map(|d| self.count(bases, scope, d))
                    .collect::<Result<_>>()?,
            },
        };

        let encoding = match &def.encoding {
            None => None,
            Some(enc) => Some(self.resolve_encoding(bases, scope, enc)?),
        };

        Ok(ItemType {
            name: def.name.clone(),
            path: path.to_string(),
            eng,
            encoding,
            valid_range: def.valid_range.clone(),
            initial_value: def.initial_value.clone(),
            units: def.units.clone(),
        })
    }

    fn calibration(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        default: Option<&crate::model::CalibratorDef>,
        context: &[crate::model::ContextCalibratorDef],
    ) -> Result<Calibration> {
        let mut calibration = Calibration {
            default: default.map(Calibrator::from_def),
            context: Vec::with_capacity(context.len()),
        };
        for cc in context {
            calibration.context.push(ContextCalibrator {
                context: cc
                    .context_match
                    .iter()
                    .map(|c| self.comparison(bases, scope, c))
                    .collect::<Result<_>>()?,
                calibrator: Calibrator::from_def(&cc.calibrator),
            });
        }
        Ok(calibration)
    }

    fn resolve_encoding(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        def: &RawEncoding,
    ) -> Result<Encoding> {
        Ok(match def {
            RawEncoding::Integer {
                size_in_bits,
                encoding,
                byte_order,
                default_calibrator,
                context_calibrators,
            } => {
                if !(1..=64).contains(size_in_bits) {
                    return Err(Error::Model(format!(
                        "{}: integer size must be 1 to 64 bits, got {size_in_bits}",
                        scope.from
                    )));
                }
                Encoding::Integer {
                    size: *size_in_bits,
                    kind: *encoding,
                    byte_order: *byte_order,
                    calibration: self.calibration(
                        bases,
                        scope,
                        default_calibrator.as_ref(),
                        context_calibrators,
                    )?,
                }
            }
            RawEncoding::Float {
                size_in_bits,
                byte_order,
                default_calibrator,
                context_calibrators,
            } => {
                if ![32, 64].contains(size_in_bits) {
                    return Err(Error::Model(format!(
                        "{}: float size must be 32 or 64 bits, got {size_in_bits}",
                        scope.from
                    )));
                }
                Encoding::Float {
                    size: *size_in_bits,
                    byte_order: *byte_order,
                    calibration: self.calibration(
                        bases,
                        scope,
                        default_calibrator.as_ref(),
                        context_calibrators,
                    )?,
                }
            }
            RawEncoding::String { charset, size } => Encoding::String {
                charset: *charset,
                size: match size {
                    StringSizeDef::Fixed { size_in_bits } => StringSize::Fixed(*size_in_bits),
                    StringSizeDef::Terminated {
                        termination_char,
                        max_size_in_bits,
                    } => StringSize::Terminated {
                        terminator: hex::decode(termination_char.trim_start_matches("0x"))
                            .map_err(|e| {
                                Error::Model(format!(
                                    "{}: invalid termination char '{termination_char}': {e}",
                                    scope.from
                                ))
                            })?,
                        max: *max_size_in_bits,
                    },
                    StringSizeDef::LeadingSize {
                        size_in_bits_of_size_tag,
                    } => StringSize::LeadingSize(*size_in_bits_of_size_tag),
                    StringSizeDef::Dynamic(d) => StringSize::Dynamic(self.dynamic(bases, scope, d)?),
                },
            },
            RawEncoding::Binary { size } => Encoding::Binary {
                size: match size {
                    BinarySizeDef::Fixed { size_in_bits } => BinarySize::Fixed(*size_in_bits),
                    BinarySizeDef::Dynamic(d) => BinarySize::Dynamic(self.dynamic(bases, scope, d)?),
                },
            },
            RawEncoding::Timecode { format } => {
                timecode::validate(format)?;
                Encoding::Timecode(format.clone())
            }
        })
    }

    fn resolve_container(
        &self,
        bases: &[Option<CommandId>],
        src: &ContainerSource,
    ) -> Result<Container> {
        let scope = Scope {
            system: src.system,
            command: src.command,
            from: &src.path,
        };

        let mut base = None;
        let mut restrictions = Vec::default();
        if let Some(def) = src.base {
            base = Some(self.resolve_ref(
                &self.container_paths,
                ObjectKind::Container,
                scope,
                &def.container_ref,
            )?);
            for criteria in &def.restriction_criteria {
                restrictions.push(self.comparison(bases, scope, criteria)?);
            }
        } else if let Some(base_cmd) = src.command.and_then(|c| bases[c.0]) {
            // command containers default to extending the base command's container
            base = self
                .containers
                .iter()
                .position(|c| c.command == Some(base_cmd))
                .map(ContainerId);
        }

        let mut entries = Vec::with_capacity(src.entries.len());
        for def in src.entries {
            entries.push(self.resolve_entry(bases, scope, def)?);
        }

        Ok(Container {
            name: src.name.clone(),
            path: src.path.clone(),
            is_abstract: src.is_abstract,
            description: src.description.clone(),
            base,
            chain: Vec::default(),
            restrictions,
            entries,
            command: src.command,
        })
    }

    fn resolve_entry(
        &self,
        bases: &[Option<CommandId>],
        scope: Scope,
        def: &EntryDef,
    ) -> Result<Entry> {
        let targets = usize::from(def.parameter_ref.is_some())
            + usize::from(def.argument_ref.is_some())
            + usize::from(def.container_ref.is_some())
            + usize::from(def.fixed_value.is_some());
        if targets != 1 {
            return Err(Error::Model(format!(
                "entry in {} must have exactly one parameter, argument, container, or fixed value",
                scope.from
            )));
        }

        let target = if let Some(fv) = &def.fixed_value {
            let value = RawBits::from_hex(&fv.binary_value).map_err(|e| {
                Error::Model(format!(
                    "{}: invalid fixed value '{}': {e}",
                    scope.from, fv.binary_value
                ))
            })?;
            EntryTarget::FixedValue {
                name: fv.name.clone().unwrap_or_else(|| "FixedValue".to_string()),
                value: value.low_bits(fv.size_in_bits as usize),
            }
        } else if let Some(c) = &def.container_ref {
            EntryTarget::Container(self.resolve_ref(
                &self.container_paths,
                ObjectKind::Container,
                scope,
                c,
            )?)
        } else {
            EntryTarget::Item(self.resolve_item(
                bases,
                scope,
                def.parameter_ref.as_ref(),
                def.argument_ref.as_ref(),
            )?)
        };

        Ok(Entry {
            target,
            condition: def
                .include_condition
                .iter()
                .map(|c| self.comparison(bases, scope, c))
                .collect::<Result<_>>()?,
            repeat: match &def.repeat {
                Some(r) => Some(Repeat {
                    count: self.count(bases, scope, &r.count)?,
                    offset_size_in_bits: r.offset_size_in_bits,
                }),
                None => None,
            },
            location: def.location.as_ref().map(|l| Location {
                reference: l.reference,
                location_in_bits: l.location_in_bits,
            }),
        })
    }
}

fn form(use_calibrated_value: bool) -> ValueForm {
    if use_calibrated_value {
        ValueForm::Calibrated
    } else {
        ValueForm::Uncalibrated
    }
}

/// Number of seconds between the hifitime reference epoch 1900 and the CCSDS epoch 1958.
const CCSDS_EPOCH_TAI_SECS: f64 = 1_830_297_600.0;

fn parse_epoch(s: &str) -> Result<Epoch> {
    match s {
        "TAI" => Ok(Epoch::from_tai_seconds(CCSDS_EPOCH_TAI_SECS)),
        "UNIX" => Ok(Epoch::from_unix_seconds(0.0)),
        "GPS" => Ok(Epoch::from_gpst_seconds(0.0)),
        _ => Epoch::from_str(s).map_err(|e| Error::Model(format!("invalid epoch '{s}': {e}"))),
    }
}

fn container_chain(containers: &[Container], id: ContainerId) -> Result<Vec<ContainerId>> {
    let mut chain = Vec::default();
    let mut cur = Some(id);
    while let Some(cid) = cur {
        if chain.contains(&cid) {
            return Err(Error::InheritanceCycle(containers[id.0].path.clone()));
        }
        chain.push(cid);
        cur = containers[cid.0].base;
    }
    chain.reverse();
    Ok(chain)
}

/// Restrictions must compare an item laid out by the container or one of its ancestors.
fn check_restrictions(containers: &[Container]) -> Result<()> {
    for c in containers {
        for criteria in &c.restrictions {
            let Some(item) = criteria.item() else {
                continue;
            };
            let mut seen = Vec::default();
            if !c
                .chain
                .iter()
                .any(|cid| lays_out(containers, *cid, item, &mut seen))
            {
                return Err(Error::Model(format!(
                    "{}: restriction on {} which is not an entry of the container or its ancestors",
                    c.path,
                    criteria.item_full_path()
                )));
            }
        }
    }
    Ok(())
}

fn lays_out(
    containers: &[Container],
    id: ContainerId,
    item: ItemId,
    seen: &mut Vec<ContainerId>,
) -> bool {
    if seen.contains(&id) {
        return false;
    }
    seen.push(id);
    containers[id.0].entries.iter().any(|e| match &e.target {
        EntryTarget::Item(i) => *i == item,
        EntryTarget::Container(nested) => containers[nested.0]
            .chain
            .iter()
            .any(|cid| lays_out(containers, *cid, item, seen)),
        EntryTarget::FixedValue { .. } => false,
    })
}

/// Aggregate and array types must not contain themselves.
fn check_type_nesting(types: &[ItemType]) -> Result<()> {
    fn visit(types: &[ItemType], id: TypeId, stack: &mut Vec<TypeId>) -> Result<()> {
        if stack.contains(&id) {
            return Err(Error::Model(format!(
                "type {} contains itself",
                types[id.0].path
            )));
        }
        stack.push(id);
        match &types[id.0].eng {
            EngType::Aggregate(members) => {
                for m in members {
                    visit(types, m.type_id, stack)?;
                }
            }
            EngType::Array { element, .. } => visit(types, *element, stack)?,
            _ => {}
        }
        stack.pop();
        Ok(())
    }
    for idx in 0..types.len() {
        visit(types, TypeId(idx), &mut Vec::default())?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "name": "Sample",
        "parameter_types": [
            {"name": "U1", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 1}}},
            {"name": "U2", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 2}}},
            {"name": "U3", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 3}}},
            {"name": "U11", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 11}}},
            {"name": "U14", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 14}}},
            {"name": "U16", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 16}}},
            {"name": "SecHType",
             "engineering": {"enumeration": {"values": [
                {"value": 0, "label": "NotPresent"}, {"value": 1, "label": "Present"}]}},
             "encoding": {"integer": {"size_in_bits": 1}}}
        ],
        "parameters": [
            {"name": "CCSDS_Version", "type_ref": "U3"},
            {"name": "CCSDS_Type", "type_ref": "U1"},
            {"name": "CCSDS_SecH", "type_ref": "SecHType"},
            {"name": "CCSDS_APID", "type_ref": "U11"},
            {"name": "CCSDS_GroupFlags", "type_ref": "U2"},
            {"name": "CCSDS_Count", "type_ref": "U14"},
            {"name": "CCSDS_Length", "type_ref": "U16"},
            {"name": "MODE", "type_ref": "U16"}
        ],
        "containers": [
            {"name": "CCSDSPacket", "abstract": true, "entries": [
                {"parameter_ref": "CCSDS_Version"},
                {"parameter_ref": "CCSDS_Type"},
                {"parameter_ref": "CCSDS_SecH"},
                {"parameter_ref": "CCSDS_APID"},
                {"parameter_ref": "CCSDS_GroupFlags"},
                {"parameter_ref": "CCSDS_Count"},
                {"parameter_ref": "CCSDS_Length"}
            ]},
            {"name": "Tlm", "abstract": true,
             "base": {"container_ref": "CCSDSPacket",
                      "restriction_criteria": [{"parameter_ref": "CCSDS_Type", "value": "0"}]}}
        ],
        "streams": [{"name": "TLM", "container_ref": "CCSDSPacket"}],
        "space_systems": [{
            "name": "Payload",
            "parameters": [{"name": "MODE", "type_ref": "U16"}],
            "containers": [
                {"name": "Status",
                 "base": {"container_ref": "../Tlm",
                          "restriction_criteria": [{"parameter_ref": "CCSDS_APID", "value": "100"}]},
                 "entries": [{"parameter_ref": "MODE"}, {"parameter_ref": "/Sample/MODE"}]},
                {"name": "Extended", "base": {"container_ref": "Status"}}
            ]
        }]
    }"#;

    pub(crate) fn sample_db() -> Database {
        Database::from_json_str(SAMPLE).unwrap()
    }

    #[test]
    fn paths_and_lookup() {
        let db = sample_db();
        let apid = db.parameter("CCSDS_APID").unwrap();
        assert_eq!(db.item(apid.into()).path, "/Sample/CCSDS_APID");
        assert_eq!(db.parameter("/Sample/CCSDS_APID").unwrap(), apid);
        assert_eq!(db.type_of(apid.into()).name, "U11");

        assert!(matches!(
            db.parameter("MODE"),
            Err(Error::Ambiguous { matches, .. }) if matches == vec!["/Sample/MODE", "/Sample/Payload/MODE"]
        ));
        assert!(db.parameter("Payload/MODE").is_ok());
        assert!(matches!(
            db.parameter("NOPE"),
            Err(Error::NotFound {
                kind: ObjectKind::Parameter,
                ..
            })
        ));
    }

    #[test]
    fn relative_and_ancestor_references() {
        let db = sample_db();
        let status = db.container_by_id(db.container("Status").unwrap());
        assert_eq!(status.path, "/Sample/Payload/Status");
        assert_eq!(status.restrictions[0].item_full_path(), "/Sample/CCSDS_APID");

        let local = db.parameter("/Sample/Payload/MODE").unwrap();
        let root = db.parameter("/Sample/MODE").unwrap();
        let targets: Vec<ItemId> = status
            .entries
            .iter()
            .filter_map(|e| match e.target {
                EntryTarget::Item(item) => Some(item),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec![local.into(), root.into()]);
    }

    #[test]
    fn chains_and_stream_candidates() {
        let db = sample_db();
        let packet = db.container("CCSDSPacket").unwrap();
        let tlm = db.container("Tlm").unwrap();
        let status = db.container("Status").unwrap();
        let extended = db.container("Extended").unwrap();
        assert_eq!(
            db.container_by_id(extended).chain,
            vec![packet, tlm, status, extended]
        );
        assert!(db.inherits_from(extended, packet));
        assert!(!db.inherits_from(packet, extended));

        let stream = db.stream_by_id(db.stream("TLM").unwrap());
        assert_eq!(stream.root, packet);
        assert_eq!(stream.candidates, vec![extended, status]);
    }

    #[test]
    fn unresolved_reference() {
        let doc = r#"{"name": "S", "parameters": [{"name": "P", "type_ref": "Missing"}]}"#;
        let err = Database::from_json_str(doc).unwrap_err();
        assert!(
            matches!(&err, Error::UnresolvedReference { from, kind: ObjectKind::Type, reference }
                if from == "/S/P" && reference == "Missing"),
            "{err:?}"
        );
    }

    #[test]
    fn inheritance_cycle() {
        let doc = r#"{"name": "S", "containers": [
            {"name": "A", "base": {"container_ref": "B"}},
            {"name": "B", "base": {"container_ref": "A"}}
        ]}"#;
        assert!(matches!(
            Database::from_json_str(doc),
            Err(Error::InheritanceCycle(_))
        ));
    }

    #[test]
    fn entry_needs_exactly_one_target() {
        let doc = r#"{"name": "S", "containers": [{"name": "A", "entries": [{}]}]}"#;
        assert!(matches!(Database::from_json_str(doc), Err(Error::Model(_))));
    }

    #[test]
    fn command_assignments_restrict_base_container() {
        let doc = r#"{
            "name": "S",
            "argument_types": [
                {"name": "U8", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 8}}}
            ],
            "meta_commands": [
                {"name": "Base", "abstract": true,
                 "arguments": [{"name": "Op", "type_ref": "U8"}],
                 "command_container": {"entries": [{"argument_ref": "Op"}]}},
                {"name": "Reset",
                 "base": {"meta_command_ref": "Base",
                          "argument_assignments": [{"argument_name": "Op", "value": "7"}]}}
            ]
        }"#;
        let db = Database::from_json_str(doc).unwrap();
        let base = db.meta_command("Base").unwrap();
        let reset = db.meta_command_by_id(db.meta_command("Reset").unwrap());
        assert_eq!(reset.base, Some(base));
        assert_eq!(reset.assignments[0].to_string(), "Op==7{cal}");

        let container = db.container_by_id(reset.container);
        assert_eq!(container.base, Some(db.meta_command_by_id(base).container));
        assert_eq!(container.restrictions, reset.assignments);
        // command containers are not sequence containers
        assert!(db.container("Reset").is_err());
        assert!(db.find_item(Some(db.meta_command("Reset").unwrap()), "Op").is_ok());
    }

    #[test]
    fn restriction_outside_chain() {
        let doc = r#"{
            "name": "S",
            "parameter_types": [
                {"name": "U8", "engineering": {"integer": {}}, "encoding": {"integer": {"size_in_bits": 8}}}
            ],
            "parameters": [{"name": "A", "type_ref": "U8"}, {"name": "UNRELATED", "type_ref": "U8"}],
            "containers": [
                {"name": "Base", "entries": [{"parameter_ref": "A"}]},
                {"name": "Child", "base": {"container_ref": "Base",
                    "restriction_criteria": [{"parameter_ref": "UNRELATED", "value": "5"}]}}
            ]
        }"#;
        let err = Database::from_json_str(doc).unwrap_err();
        assert!(
            matches!(&err, Error::Model(msg) if msg.starts_with("/S/Child: restriction on /S/UNRELATED")),
            "{err:?}"
        );

        // items of nested containers count
        let doc = doc.replace(
            r#"{"name": "Base", "entries": [{"parameter_ref": "A"}]}"#,
            r#"{"name": "Inner", "entries": [{"parameter_ref": "UNRELATED"}]},
               {"name": "Base", "entries": [{"parameter_ref": "A"}, {"container_ref": "Inner"}]}"#,
        );
        assert!(Database::from_json_str(&doc).is_ok());
    }

    #[test]
    fn epochs() {
        assert_eq!(
            parse_epoch("TAI").unwrap(),
            Epoch::from_str("1958-01-01T00:00:00 TAI").unwrap()
        );
        assert_eq!(parse_epoch("UNIX").unwrap(), Epoch::from_unix_seconds(0.0));
        assert!(parse_epoch("whenever").is_err());
    }
}
