//! Comparable item/value units used for include conditions, restriction criteria, context
//! calibrator matches, and caller supplied values.
use std::{cmp::Ordering, collections::HashMap, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    database::{Database, ItemId},
    value::parse_number,
    DecodedValue, Value,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[default]
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
}

impl ComparisonOperator {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Whether `actual <op> expected` holds given `actual.cmp(expected)`.
    #[must_use]
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::Less => ordering == Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

impl Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" | "=" => Self::Equal,
            "!=" => Self::NotEqual,
            "<" => Self::Less,
            "<=" => Self::LessOrEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterOrEqual,
            _ => return Err(format!("invalid comparison operator '{s}'")),
        })
    }
}

/// Whether a value is compared in its calibrated (engineering) or uncalibrated form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueForm {
    #[default]
    Calibrated,
    Uncalibrated,
}

impl Display for ValueForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calibrated => f.write_str("{cal}"),
            Self::Uncalibrated => f.write_str("{uncal}"),
        }
    }
}

/// Source of already known item values, e.g., items decoded earlier in the same container.
pub trait ValueLookup {
    fn lookup(&self, item: ItemId) -> Option<&DecodedValue>;
}

impl ValueLookup for HashMap<ItemId, DecodedValue> {
    fn lookup(&self, item: ItemId) -> Option<&DecodedValue> {
        self.get(&item)
    }
}

/// A [ValueLookup] that knows no values.
pub struct NoValues;

impl ValueLookup for NoValues {
    fn lookup(&self, _item: ItemId) -> Option<&DecodedValue> {
        None
    }
}

/// An item, comparison operator, and value, or just a fixed literal value.
///
/// # Example
/// ```
/// use xtce::ContainerEntryValue;
///
/// let fixed = ContainerEntryValue::fixed("6");
/// assert_eq!(fixed.to_string(), "==6{cal}");
/// assert_eq!(fixed.to_string_without_item(), "==6{cal}");
/// ```
#[derive(Debug, Clone)]
pub struct ContainerEntryValue {
    item: Option<ItemId>,
    name: String,
    path: String,
    value: String,
    operator: ComparisonOperator,
    form: ValueForm,
}

impl ContainerEntryValue {
    /// A literal value with no item, compared for equality in calibrated form.
    pub fn fixed(value: impl Into<String>) -> Self {
        ContainerEntryValue {
            item: None,
            name: String::new(),
            path: String::new(),
            value: value.into(),
            operator: ComparisonOperator::Equal,
            form: ValueForm::Calibrated,
        }
    }

    /// A value for `item`, taking its name and path from `db`.
    pub fn new(
        db: &Database,
        item: ItemId,
        value: impl Into<String>,
        operator: ComparisonOperator,
        form: ValueForm,
    ) -> Self {
        let def = db.item(item);
        Self::resolved(item, &def.name, &def.path, value, operator, form)
    }

    pub(crate) fn resolved(
        item: ItemId,
        name: &str,
        path: &str,
        value: impl Into<String>,
        operator: ComparisonOperator,
        form: ValueForm,
    ) -> Self {
        ContainerEntryValue {
            item: Some(item),
            name: name.to_string(),
            path: path.to_string(),
            value: value.into(),
            operator,
            form,
        }
    }

    #[must_use]
    pub fn item(&self) -> Option<ItemId> {
        self.item
    }

    /// Item name, empty for fixed values.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified item path, empty for fixed values.
    #[must_use]
    pub fn item_full_path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    #[must_use]
    pub fn form(&self) -> ValueForm {
        self.form
    }

    /// E.g., `==6{cal}`.
    #[must_use]
    pub fn to_string_without_item(&self) -> String {
        format!("{}{}{}", self.operator, self.value, self.form)
    }

    /// Whether `actual` satisfies this comparison.
    #[must_use]
    pub fn is_satisfied_by(&self, actual: &DecodedValue) -> bool {
        match compare_value(actual.for_form(self.form), &self.value) {
            Some(ordering) => self.operator.holds(ordering),
            // Values that cannot be ordered are only ever "not equal"
            None => self.operator == ComparisonOperator::NotEqual,
        }
    }

    /// Whether both could hold at the same time for the same item.
    ///
    /// Unlike equality the value form is not considered.
    #[must_use]
    pub fn is_compatible_with(&self, other: &ContainerEntryValue) -> bool {
        use ComparisonOperator::{Equal, NotEqual};

        if self.item != other.item {
            return false;
        }
        let ordering = compare_literals(&self.value, &other.value);
        if self.operator == other.operator && ordering == Some(Ordering::Equal) {
            return true;
        }
        match (self.operator, other.operator) {
            (Equal, op) => ordering.map_or(true, |o| op.holds(o)),
            (op, Equal) => ordering.map_or(true, |o| op.holds(o.reverse())),
            (NotEqual, _) | (_, NotEqual) => true,
            (a, b) => {
                let (Some(x), Some(y)) = (parse_number(&self.value), parse_number(&other.value))
                else {
                    return true;
                };
                ranges_overlap(a, x, b, y)
            }
        }
    }
}

/// Whether `{v | v a x}` and `{v | v b y}` intersect for two relational operators.
fn ranges_overlap(a: ComparisonOperator, x: f64, b: ComparisonOperator, y: f64) -> bool {
    use ComparisonOperator::{Less, LessOrEqual};

    let is_upper = |op| matches!(op, Less | LessOrEqual);
    match (is_upper(a), is_upper(b)) {
        // same direction always overlaps
        (true, true) | (false, false) => true,
        (true, false) => lower_below_upper(b, y, a, x),
        (false, true) => lower_below_upper(a, x, b, y),
    }
}

fn lower_below_upper(
    lower_op: ComparisonOperator,
    lower: f64,
    upper_op: ComparisonOperator,
    upper: f64,
) -> bool {
    use ComparisonOperator::{GreaterOrEqual, LessOrEqual};

    if lower_op == GreaterOrEqual && upper_op == LessOrEqual {
        lower <= upper
    } else {
        lower < upper
    }
}

/// Order `actual` relative to the literal `expected`.
fn compare_value(actual: &Value, expected: &str) -> Option<Ordering> {
    match actual {
        Value::Enumerated { label, .. } | Value::Boolean { label, .. } => {
            if label == expected || label.eq_ignore_ascii_case(expected) {
                return Some(Ordering::Equal);
            }
            let x = actual.as_f64()?;
            match parse_number(expected) {
                Some(y) => x.partial_cmp(&y),
                None => Some(label.as_str().cmp(expected)),
            }
        }
        Value::String(s) => Some(s.as_str().cmp(expected)),
        Value::Binary(bits) => {
            let other = crate::RawBits::from_hex(expected).ok()?;
            Some(
                strip_leading_zeros(&bits.to_aligned_bytes())
                    .cmp(strip_leading_zeros(&other.to_aligned_bytes())),
            )
        }
        Value::Time(epoch) => {
            let other = hifitime::Epoch::from_str(expected).ok()?;
            epoch.partial_cmp(&other)
        }
        Value::Unsigned(_) | Value::Signed(_) | Value::Float(_) => {
            let x = actual.as_f64()?;
            let y = parse_number(expected)?;
            x.partial_cmp(&y)
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let idx = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[idx..]
}

/// Order two literals, numerically when both are numbers.
fn compare_literals(a: &str, b: &str) -> Option<Ordering> {
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        (None, None) => Some(a.cmp(b)),
        _ => None,
    }
}

impl PartialEq for ContainerEntryValue {
    fn eq(&self, other: &Self) -> bool {
        self.item == other.item
            && self.value == other.value
            && self.operator == other.operator
            && self.form == other.form
    }
}

impl Eq for ContainerEntryValue {}

impl Display for ContainerEntryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.to_string_without_item())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::sample_db;
    use test_case::test_case;

    fn apid(db: &Database, value: &str, op: ComparisonOperator, form: ValueForm) -> ContainerEntryValue {
        let item = db.parameter("CCSDS_APID").unwrap();
        ContainerEntryValue::new(db, item.into(), value, op, form)
    }

    #[test]
    fn fixed_value_strings() {
        let v = ContainerEntryValue::fixed("6");
        assert_eq!(v.name(), "");
        assert_eq!(v.item_full_path(), "");
        assert_eq!(v.operator(), ComparisonOperator::Equal);
        assert_eq!(v.form(), ValueForm::Calibrated);
        assert_eq!(v.to_string(), "==6{cal}");
        assert_eq!(v.to_string_without_item(), "==6{cal}");
    }

    #[test]
    fn item_value_strings() {
        let db = sample_db();
        let v = apid(&db, "100", ComparisonOperator::NotEqual, ValueForm::Uncalibrated);
        assert_eq!(v.name(), "CCSDS_APID");
        assert_eq!(v.item_full_path(), "/Sample/CCSDS_APID");
        assert_eq!(v.to_string_without_item(), "!=100{uncal}");
        assert_eq!(v.to_string(), "CCSDS_APID!=100{uncal}");
    }

    #[test]
    fn equality_considers_form() {
        let db = sample_db();
        let cal = apid(&db, "100", ComparisonOperator::Equal, ValueForm::Calibrated);
        let uncal = apid(&db, "100", ComparisonOperator::Equal, ValueForm::Uncalibrated);
        assert_eq!(cal, cal.clone());
        assert_ne!(cal, uncal);
        assert!(cal.is_compatible_with(&uncal));
    }

    #[test_case("==", "5", "==", "5", true; "same value and operator")]
    #[test_case("==", "5", "==", "5.0", true; "numerically equal")]
    #[test_case("==", "5", "==", "6", false; "different equal values")]
    #[test_case("==", "5", "!=", "5", false; "equal versus not equal same value")]
    #[test_case("==", "5", "!=", "6", true; "equal versus not equal other value")]
    #[test_case("!=", "5", "!=", "6", true; "both not equal")]
    #[test_case("==", "5", "<", "3", false; "equal outside upper bound")]
    #[test_case("<", "3", ">", "5", false; "disjoint ranges")]
    #[test_case(">=", "3", "<=", "3", true; "touching inclusive ranges")]
    #[test_case(">", "3", "<", "5", true; "overlapping ranges")]
    fn compatibility(op_a: &str, a: &str, op_b: &str, b: &str, expected: bool) {
        let db = sample_db();
        let x = apid(&db, a, op_a.parse().unwrap(), ValueForm::Calibrated);
        let y = apid(&db, b, op_b.parse().unwrap(), ValueForm::Uncalibrated);
        assert_eq!(x.is_compatible_with(&y), expected, "{x} vs {y}");
        assert_eq!(y.is_compatible_with(&x), expected, "{y} vs {x}");
    }

    #[test]
    fn compatibility_requires_same_item() {
        let db = sample_db();
        let x = apid(&db, "5", ComparisonOperator::Equal, ValueForm::Calibrated);
        assert!(!x.is_compatible_with(&ContainerEntryValue::fixed("5")));
    }

    #[test]
    fn satisfied_by_enumeration_label_or_value() {
        let decoded = DecodedValue {
            raw: crate::RawBits::from_uint(1, 1),
            uncalibrated: Value::Unsigned(1),
            calibrated: Value::Enumerated {
                value: 1,
                label: "Present".to_string(),
            },
        };
        let by_label = ContainerEntryValue::fixed("Present");
        assert!(by_label.is_satisfied_by(&decoded));
        assert!(!ContainerEntryValue::fixed("NotPresent").is_satisfied_by(&decoded));
        assert!(ContainerEntryValue::fixed("1").is_satisfied_by(&decoded));
    }
}
