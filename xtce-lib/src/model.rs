//! Model document types.
//!
//! These mirror the structure of an XTCE database with all cross references held as path
//! strings. A document is loaded from JSON and then resolved into a [crate::Database], which
//! is what the processing code works from.
//!
//! References may be absolute (`/Root/Sub/NAME`), relative to the space system holding the
//! reference (`Sub/NAME`, `../Other/NAME`), or a bare name, which is searched for in the
//! holding space system and then each of its ancestors.
use serde::{Deserialize, Serialize};

use crate::{timecode, ComparisonOperator};

fn yes() -> bool {
    true
}

fn one() -> f64 {
    1.0
}

fn default_int_size() -> u32 {
    32
}

fn default_float_size() -> u32 {
    64
}

fn default_zero_string() -> String {
    "False".to_string()
}

fn default_one_string() -> String {
    "True".to_string()
}

fn default_terminator() -> String {
    "00".to_string()
}

fn default_epoch() -> String {
    "TAI".to_string()
}

fn default_spline_order() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceSystem {
    pub name: String,
    pub short_description: Option<String>,
    pub parameter_types: Vec<DataType>,
    pub argument_types: Vec<DataType>,
    pub parameters: Vec<ItemDef>,
    pub containers: Vec<ContainerDef>,
    pub meta_commands: Vec<MetaCommandDef>,
    pub streams: Vec<StreamDef>,
    pub space_systems: Vec<SpaceSystem>,
}

/// A parameter or argument definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    pub name: String,
    pub type_ref: String,
    #[serde(default)]
    pub initial_value: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    pub engineering: EngineeringType,
    #[serde(default)]
    pub encoding: Option<RawEncoding>,
    #[serde(default)]
    pub valid_range: Option<ValidRange>,
    #[serde(default)]
    pub initial_value: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineeringType {
    Integer {
        #[serde(default)]
        signed: bool,
        #[serde(default = "default_int_size")]
        size_in_bits: u32,
    },
    Float {
        #[serde(default = "default_float_size")]
        size_in_bits: u32,
    },
    Boolean {
        #[serde(default = "default_zero_string")]
        zero_string: String,
        #[serde(default = "default_one_string")]
        one_string: String,
    },
    Enumeration {
        values: Vec<EnumValue>,
    },
    String,
    Binary,
    AbsoluteTime {
        /// `TAI` (1958-01-01), `UNIX`, `GPS`, or any epoch string hifitime can parse.
        #[serde(default = "default_epoch")]
        epoch: String,
        #[serde(default = "one")]
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
    Aggregate {
        members: Vec<MemberDef>,
    },
    Array {
        element_type_ref: String,
        dimensions: Vec<IntegerValueDef>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumValue {
    pub value: i64,
    /// Makes this a range of values `value..=max_value` sharing one label.
    #[serde(default)]
    pub max_value: Option<i64>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDef {
    pub name: String,
    pub type_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidRange {
    #[serde(default)]
    pub min_inclusive: Option<f64>,
    #[serde(default)]
    pub max_inclusive: Option<f64>,
    #[serde(default = "yes")]
    pub applies_to_calibrated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegerEncoding {
    #[default]
    Unsigned,
    SignMagnitude,
    TwosComplement,
    OnesComplement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ByteOrder {
    #[default]
    MostSignificantByteFirst,
    LeastSignificantByteFirst,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "UTF-16")]
    Utf16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEncoding {
    Integer {
        size_in_bits: u32,
        #[serde(default)]
        encoding: IntegerEncoding,
        #[serde(default)]
        byte_order: ByteOrder,
        #[serde(default)]
        default_calibrator: Option<CalibratorDef>,
        #[serde(default)]
        context_calibrators: Vec<ContextCalibratorDef>,
    },
    Float {
        size_in_bits: u32,
        #[serde(default)]
        byte_order: ByteOrder,
        #[serde(default)]
        default_calibrator: Option<CalibratorDef>,
        #[serde(default)]
        context_calibrators: Vec<ContextCalibratorDef>,
    },
    String {
        #[serde(default)]
        charset: Charset,
        size: StringSizeDef,
    },
    Binary {
        size: BinarySizeDef,
    },
    Timecode {
        format: timecode::Format,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringSizeDef {
    Fixed {
        size_in_bits: u64,
    },
    Terminated {
        /// Hex encoded termination sequence.
        #[serde(default = "default_terminator")]
        termination_char: String,
        #[serde(default)]
        max_size_in_bits: Option<u64>,
    },
    /// Leading tag holding the string length in bytes.
    LeadingSize { size_in_bits_of_size_tag: u32 },
    /// Size in bits taken from another item.
    Dynamic(DynamicValueDef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarySizeDef {
    Fixed { size_in_bits: u64 },
    Dynamic(DynamicValueDef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegerValueDef {
    Fixed(u64),
    Dynamic(DynamicValueDef),
}

/// An integer value taken from another item, `value * slope + intercept`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicValueDef {
    #[serde(default)]
    pub parameter_ref: Option<String>,
    #[serde(default)]
    pub argument_ref: Option<String>,
    #[serde(default = "yes")]
    pub use_calibrated_value: bool,
    #[serde(default = "one")]
    pub slope: f64,
    #[serde(default)]
    pub intercept: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibratorDef {
    Polynomial {
        terms: Vec<PolynomialTerm>,
    },
    Spline {
        points: Vec<SplinePoint>,
        #[serde(default = "default_spline_order")]
        order: u32,
        #[serde(default)]
        extrapolate: bool,
    },
    MathOperation {
        operations: Vec<MathOperand>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolynomialTerm {
    pub coefficient: f64,
    pub exponent: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplinePoint {
    pub raw: f64,
    pub calibrated: f64,
}

/// One postfix (RPN) element of a math operation calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOperand {
    ThisParameter,
    Value(f64),
    Operator(MathOperator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Negate,
    Abs,
    Inverse,
    Ln,
    Log,
    Exp,
    Sqrt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextCalibratorDef {
    pub context_match: Vec<ComparisonDef>,
    pub calibrator: CalibratorDef,
}

/// A comparison of an item against a literal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonDef {
    #[serde(default)]
    pub parameter_ref: Option<String>,
    #[serde(default)]
    pub argument_ref: Option<String>,
    pub value: String,
    #[serde(default)]
    pub comparison_operator: ComparisonOperator,
    #[serde(default = "yes")]
    pub use_calibrated_value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDef {
    pub name: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub base: Option<BaseContainerDef>,
    #[serde(default)]
    pub entries: Vec<EntryDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseContainerDef {
    pub container_ref: String,
    #[serde(default)]
    pub restriction_criteria: Vec<ComparisonDef>,
}

/// One entry of a container. Exactly one of the `*_ref`/`fixed_value` fields must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDef {
    pub parameter_ref: Option<String>,
    pub argument_ref: Option<String>,
    pub container_ref: Option<String>,
    pub fixed_value: Option<FixedValueDef>,
    pub include_condition: Vec<ComparisonDef>,
    pub repeat: Option<RepeatDef>,
    pub location: Option<LocationDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedValueDef {
    #[serde(default)]
    pub name: Option<String>,
    /// Hex encoded value, right aligned in `size_in_bits`.
    pub binary_value: String,
    pub size_in_bits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatDef {
    pub count: IntegerValueDef,
    #[serde(default)]
    pub offset_size_in_bits: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationReference {
    ContainerStart,
    #[default]
    PreviousEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationDef {
    #[serde(default)]
    pub reference: LocationReference,
    pub location_in_bits: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCommandDef {
    pub name: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub base: Option<BaseMetaCommandDef>,
    #[serde(default)]
    pub arguments: Vec<ItemDef>,
    #[serde(default)]
    pub command_container: Option<CommandContainerDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseMetaCommandDef {
    pub meta_command_ref: String,
    #[serde(default)]
    pub argument_assignments: Vec<ArgumentAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentAssignment {
    pub argument_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandContainerDef {
    #[serde(default)]
    pub name: Option<String>,
    /// Sequence container this command container extends. When not set the container of
    /// the base meta command, if any, is used.
    #[serde(default)]
    pub base: Option<BaseContainerDef>,
    #[serde(default)]
    pub entries: Vec<EntryDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDef {
    pub name: String,
    pub container_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_document() {
        let doc = r#"{
            "name": "Sat",
            "parameter_types": [
                {"name": "U8", "engineering": {"integer": {}},
                 "encoding": {"integer": {"size_in_bits": 8}}},
                {"name": "Str", "engineering": "string",
                 "encoding": {"string": {"charset": "UTF-16", "size": {"terminated": {}}}}}
            ],
            "parameters": [{"name": "P", "type_ref": "U8"}],
            "containers": [{
                "name": "C",
                "abstract": true,
                "entries": [
                    {"parameter_ref": "P", "repeat": {"count": {"fixed": 2}}},
                    {"fixed_value": {"binary_value": "0xff", "size_in_bits": 8},
                     "include_condition": [{"parameter_ref": "P", "value": "1", "comparison_operator": "!="}]}
                ]
            }]
        }"#;
        let ss: SpaceSystem = serde_json::from_str(doc).unwrap();
        assert_eq!(ss.name, "Sat");
        assert!(ss.containers[0].is_abstract);
        assert_eq!(ss.containers[0].entries.len(), 2);
        let cond = &ss.containers[0].entries[1].include_condition[0];
        assert_eq!(cond.comparison_operator, ComparisonOperator::NotEqual);
        assert!(cond.use_calibrated_value);
        match &ss.parameter_types[1].encoding {
            Some(RawEncoding::String { charset, size }) => {
                assert_eq!(*charset, Charset::Utf16);
                assert!(
                    matches!(size, StringSizeDef::Terminated { termination_char, .. } if termination_char == "00")
                );
            }
            other => panic!("unexpected encoding {other:?}"),
        }
    }
}
