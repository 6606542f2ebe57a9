//! Conversion between raw bits and values for a single parameter or argument.
use std::str::FromStr;

use hifitime::{Duration, Epoch};
use tracing::trace;

use crate::{
    calibration::Calibration,
    database::{BinarySize, Encoding, EngType, ItemType, StringSize, TypeId},
    model::{ByteOrder, Charset, EnumValue, IntegerEncoding, ValidRange},
    timecode,
    value::{parse_integer, parse_number},
    Database, DecodedValue, Error, ItemId, Outcome, RawBits, Result, Value, ValueForm,
    ValueLookup,
};

/// Intermediate numeric value between raw bits and engineering value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn as_value(self, signed: bool) -> Value {
        match self {
            Number::Int(i) => int_value(i, signed),
            Number::Float(f) => Value::Float(f),
        }
    }
}

fn int_value(i: i128, signed: bool) -> Value {
    if !signed && i >= 0 {
        Value::Unsigned(u64::try_from(i).unwrap_or(u64::MAX))
    } else {
        Value::Signed(i64::try_from(i).unwrap_or(if i < 0 { i64::MIN } else { i64::MAX }))
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn encoding_name(kind: IntegerEncoding) -> &'static str {
    match kind {
        IntegerEncoding::Unsigned => "unsigned",
        IntegerEncoding::SignMagnitude => "signMagnitude",
        IntegerEncoding::TwosComplement => "twosComplement",
        IntegerEncoding::OnesComplement => "onesComplement",
    }
}

/// Inclusive range of raw values an integer encoding can hold.
fn integer_range(kind: IntegerEncoding, size: u32) -> (i128, i128) {
    let size = i128::from(size);
    match kind {
        IntegerEncoding::Unsigned => (0, (1i128 << size) - 1),
        IntegerEncoding::TwosComplement => (-(1i128 << (size - 1)), (1i128 << (size - 1)) - 1),
        IntegerEncoding::SignMagnitude | IntegerEncoding::OnesComplement => {
            (-((1i128 << (size - 1)) - 1), (1i128 << (size - 1)) - 1)
        }
    }
}

/// Swap byte order of whole-byte values that are least significant byte first.
fn reorder(bits: RawBits, byte_order: ByteOrder) -> RawBits {
    if byte_order == ByteOrder::LeastSignificantByteFirst && bits.len() % 8 == 0 {
        let mut bytes = bits.into_bytes();
        bytes.reverse();
        RawBits::from(bytes)
    } else {
        bits
    }
}

fn overflow_warning(name: &str, actual: usize, declared: usize) -> String {
    format!("{name} raw binary length '{actual}' overflows raw encoding length of '{declared}'")
}

/// Decodes and encodes values of one item according to its type.
///
/// A codec is cheap to create, holding only a reference to the database. Data anomalies are
/// returned as warnings on each [Outcome] rather than kept on the codec.
///
/// # Example
/// ```
/// use xtce::{Database, ItemCodec, NoValues, RawBits, ValueForm};
///
/// let db = Database::from_json_str(r#"{
///     "name": "S",
///     "parameter_types": [{"name": "I32", "engineering": {"integer": {"signed": true}},
///         "encoding": {"integer": {"size_in_bits": 32, "encoding": "signMagnitude"}}}],
///     "parameters": [{"name": "P", "type_ref": "I32"}]
/// }"#).unwrap();
/// let codec = ItemCodec::new(&db, db.parameter("P").unwrap().into());
///
/// let raw = codec.encode("-1", ValueForm::Calibrated, &NoValues).unwrap();
/// assert!(raw.is_clean());
/// assert_eq!(raw.value.to_hex(), "0x80000001");
///
/// let decoded = codec.decode(&raw.value, &NoValues).unwrap();
/// assert_eq!(decoded.value.calibrated.to_string(), "-1");
/// ```
#[derive(Debug, Clone)]
pub struct ItemCodec<'db> {
    db: &'db Database,
    name: String,
    type_id: TypeId,
}

impl<'db> ItemCodec<'db> {
    #[must_use]
    pub fn new(db: &'db Database, item: ItemId) -> Self {
        let def = db.item(item);
        ItemCodec {
            db,
            name: def.name.clone(),
            type_id: def.type_id,
        }
    }

    /// Codec for a value of type `type_id` that is not itself an item, e.g., an aggregate
    /// member or array element. `name` is used in warnings.
    #[must_use]
    pub fn for_type(db: &'db Database, name: impl Into<String>, type_id: TypeId) -> Self {
        ItemCodec {
            db,
            name: name.into(),
            type_id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn item_type(&self) -> &'db ItemType {
        self.db.item_type(self.type_id)
    }

    /// True if the type has a raw encoding that can represent its engineering type.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.parts().is_ok()
    }

    fn parts(&self) -> Result<(&'db ItemType, &'db Encoding)> {
        let ty = self.item_type();
        let invalid = || Error::NoEncoding {
            item: self.name.clone(),
        };
        let encoding = ty.encoding.as_ref().ok_or_else(invalid)?;
        let compatible = match (&ty.eng, encoding) {
            (
                EngType::Integer { .. }
                | EngType::Float { .. }
                | EngType::AbsoluteTime { .. },
                Encoding::Integer { .. } | Encoding::Float { .. },
            )
            | (
                EngType::Boolean { .. } | EngType::Enumeration(_),
                Encoding::Integer { .. },
            )
            | (EngType::String, Encoding::String { .. })
            | (EngType::Binary, Encoding::Binary { .. })
            | (EngType::AbsoluteTime { .. }, Encoding::Timecode(_)) => true,
            _ => false,
        };
        if compatible {
            Ok((ty, encoding))
        } else {
            Err(invalid())
        }
    }

    /// Size in bits when it does not depend on other values or stream content.
    #[must_use]
    pub fn fixed_size_in_bits(&self) -> Option<usize> {
        let (_, encoding) = self.parts().ok()?;
        match encoding {
            Encoding::Integer { size, .. } | Encoding::Float { size, .. } => Some(*size as usize),
            Encoding::String {
                size: StringSize::Fixed(n),
                ..
            }
            | Encoding::Binary {
                size: BinarySize::Fixed(n),
            } => Some(*n as usize),
            Encoding::Timecode(format) => Some(format.size_in_bits()),
            _ => None,
        }
    }

    /// Size in bits if known without stream content, taking dynamic sizes from `values`.
    #[must_use]
    pub fn size_in_bits(&self, values: &dyn ValueLookup) -> Option<usize> {
        if let Some(n) = self.fixed_size_in_bits() {
            return Some(n);
        }
        match self.parts().ok()?.1 {
            Encoding::String {
                size: StringSize::Dynamic(dv),
                ..
            }
            | Encoding::Binary {
                size: BinarySize::Dynamic(dv),
            } => dv.evaluate(values).map(|n| n as usize),
            _ => None,
        }
    }

    /// Size in bits of a value starting at `start` in `bits`. For terminated and length
    /// prefixed strings this reads the stream. `None` if the size cannot be determined,
    /// e.g., the stream ends before a terminator.
    #[must_use]
    pub fn measure(&self, bits: &RawBits, start: usize, values: &dyn ValueLookup) -> Option<usize> {
        if let Some(n) = self.size_in_bits(values) {
            return Some(n);
        }
        let Encoding::String { charset, size } = self.parts().ok()?.1 else {
            return None;
        };
        match size {
            StringSize::Terminated { terminator, max } => {
                let width = char_width(*charset);
                let tlen = terminator.len() * 8;
                let max = max.map(|m| m as usize);
                let mut offset = 0;
                loop {
                    if max.is_some_and(|m| offset + tlen > m) {
                        return max;
                    }
                    let candidate = bits.slice(start + offset, tlen)?;
                    if candidate.as_bytes() == terminator.as_slice() {
                        return Some(offset + tlen);
                    }
                    offset += width * 8;
                }
            }
            StringSize::LeadingSize(tag) => {
                let tag = *tag as usize;
                let count = bits.slice(start, tag)?.to_u64() as usize;
                Some(tag + count * 8)
            }
            _ => None,
        }
    }

    /// Decode a raw bit window into uncalibrated and calibrated values.
    ///
    /// A window longer than the declared size is an overflow: only the low-order declared
    /// bits are used and a warning is returned. A shorter window is zero extended.
    ///
    /// # Errors
    /// [Error::NoEncoding] if the item has no usable encoding.
    pub fn decode(&self, raw: &RawBits, values: &dyn ValueLookup) -> Result<Outcome<DecodedValue>> {
        let (ty, encoding) = self.parts()?;
        let mut warnings = Vec::default();

        let raw = match self.size_in_bits(values) {
            Some(declared) => {
                if raw.len() > declared {
                    warnings.push(overflow_warning(&self.name, raw.len(), declared));
                }
                raw.low_bits(declared)
            }
            None => raw.clone(),
        };

        let (uncalibrated, calibrated) = match encoding {
            Encoding::Integer {
                size,
                kind,
                byte_order,
                calibration,
            } => {
                let u = reorder(raw.clone(), *byte_order).to_u64();
                let number = Number::Int(decode_integer(u, *kind, *size));
                let calibrated = self.calibrated(ty, number, calibration, values, &mut warnings);
                (number.as_value(*kind != IntegerEncoding::Unsigned), calibrated)
            }
            Encoding::Float {
                size,
                byte_order,
                calibration,
            } => {
                let u = reorder(raw.clone(), *byte_order).to_u64();
                let f = if *size == 32 {
                    f64::from(f32::from_bits(u as u32))
                } else {
                    f64::from_bits(u)
                };
                let number = Number::Float(f);
                let calibrated = self.calibrated(ty, number, calibration, values, &mut warnings);
                (Value::Float(f), calibrated)
            }
            Encoding::String { charset, size } => {
                let s = self.decode_string(&raw, *charset, size, &mut warnings);
                (Value::String(s.clone()), Value::String(s))
            }
            Encoding::Binary { .. } => (Value::Binary(raw.clone()), Value::Binary(raw.clone())),
            Encoding::Timecode(format) => {
                let calibrated = match timecode::decode(format, raw.as_bytes()) {
                    Ok(epoch) => Value::Time(epoch),
                    Err(err) => {
                        warnings.push(format!("{} invalid time code: {err}", self.name));
                        Value::Binary(raw.clone())
                    }
                };
                (Value::Binary(raw.clone()), calibrated)
            }
        };

        trace!(item = %self.name, raw = %raw, %calibrated, "decoded");
        Ok(Outcome::with_warnings(
            DecodedValue {
                raw,
                uncalibrated,
                calibrated,
            },
            warnings,
        ))
    }

    fn calibrated(
        &self,
        ty: &ItemType,
        number: Number,
        calibration: &Calibration,
        values: &dyn ValueLookup,
        warnings: &mut Vec<String>,
    ) -> Value {
        let number = match calibration.select(values) {
            Some(calibrator) => match calibrator.calibrate(&self.name, number.as_f64()) {
                Ok(y) => Number::Float(y),
                Err(err) => {
                    warnings.push(err.to_string());
                    number
                }
            },
            None => number,
        };
        self.engineering(ty, number, warnings)
    }

    fn engineering(&self, ty: &ItemType, number: Number, warnings: &mut Vec<String>) -> Value {
        match &ty.eng {
            EngType::Integer { signed, .. } => {
                let i = match number {
                    Number::Int(i) => i,
                    Number::Float(f) => f.round() as i128,
                };
                int_value(i, *signed)
            }
            EngType::Float { .. } => Value::Float(number.as_f64()),
            EngType::Boolean {
                zero_string,
                one_string,
            } => {
                let value = number.as_f64() != 0.0;
                Value::Boolean {
                    value,
                    label: if value { one_string } else { zero_string }.clone(),
                }
            }
            EngType::Enumeration(enums) => {
                let value = number.as_f64().round() as i64;
                match enum_label(enums, value) {
                    Some(label) => Value::Enumerated {
                        value,
                        label: label.to_string(),
                    },
                    None => {
                        warnings.push(format!(
                            "{} has undefined enumeration value of '{value}'",
                            self.name
                        ));
                        Value::Enumerated {
                            value,
                            label: value.to_string(),
                        }
                    }
                }
            }
            EngType::AbsoluteTime {
                epoch,
                scale,
                offset,
            } => Value::Time(*epoch + Duration::from_seconds(number.as_f64() * scale + offset)),
            _ => number.as_value(true),
        }
    }

    fn decode_string(
        &self,
        raw: &RawBits,
        charset: Charset,
        size: &StringSize,
        warnings: &mut Vec<String>,
    ) -> String {
        let mut bytes = raw.as_bytes();
        match size {
            StringSize::LeadingSize(tag) => {
                let tag = *tag as usize;
                let count = raw.slice(0, tag).map_or(0, |b| b.to_u64() as usize);
                let rest = raw
                    .slice(tag, raw.len().saturating_sub(tag))
                    .map(RawBits::into_bytes)
                    .unwrap_or_default();
                let end = count.min(rest.len());
                return self.decode_chars(&rest[..end], charset, warnings);
            }
            StringSize::Terminated { terminator, .. } => {
                let width = char_width(charset);
                let mut idx = 0;
                while idx + terminator.len() <= bytes.len() {
                    if &bytes[idx..idx + terminator.len()] == terminator.as_slice() {
                        bytes = &bytes[..idx];
                        break;
                    }
                    idx += width;
                }
            }
            StringSize::Fixed(_) | StringSize::Dynamic(_) => {
                // fixed size strings are padded with NUL
                let width = char_width(charset);
                while bytes.len() >= width && bytes[bytes.len() - width..].iter().all(|b| *b == 0) {
                    bytes = &bytes[..bytes.len() - width];
                }
            }
        }
        self.decode_chars(bytes, charset, warnings)
    }

    fn decode_chars(&self, bytes: &[u8], charset: Charset, warnings: &mut Vec<String>) -> String {
        match charset {
            Charset::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    warnings.push(format!("{} contains invalid UTF-8 data", self.name));
                    String::from_utf8_lossy(bytes).into_owned()
                }
            },
            Charset::Utf16 => {
                let units: Vec<u16> = bytes
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
                    .collect();
                match String::from_utf16(&units) {
                    Ok(s) => s,
                    Err(_) => {
                        warnings.push(format!("{} contains invalid UTF-16 data", self.name));
                        String::from_utf16_lossy(&units)
                    }
                }
            }
        }
    }

    /// Encode `value` into raw bits.
    ///
    /// `value` is an engineering value when `form` is [ValueForm::Calibrated], in which case
    /// it is uncalibrated first, or a raw numeric value when [ValueForm::Uncalibrated]. Values
    /// that cannot be parsed or are out of range produce warnings; an unparsable value
    /// encodes as all zeros.
    ///
    /// # Errors
    /// [Error::NoEncoding] if the item has no usable encoding.
    pub fn encode(
        &self,
        value: &str,
        form: ValueForm,
        values: &dyn ValueLookup,
    ) -> Result<Outcome<RawBits>> {
        let (ty, encoding) = self.parts()?;
        let mut warnings = Vec::default();
        let invalid = |warnings: &mut Vec<String>| {
            warnings.push(format!(
                "{} Invalid {} value for uncalibrate of '{value}'",
                self.name,
                ty.eng.name()
            ));
        };

        let bits = match encoding {
            Encoding::Integer {
                size,
                kind,
                byte_order,
                calibration,
            } => match self.raw_number(ty, value, form, calibration, integer_range(*kind, *size), values, &mut warnings) {
                Some(number) => {
                    let raw = match number {
                        Number::Int(i) => i,
                        Number::Float(f) => f.round() as i128,
                    };
                    let bits = self.encode_integer(raw, *kind, *size, &mut warnings);
                    reorder(bits, *byte_order)
                }
                None => {
                    invalid(&mut warnings);
                    RawBits::zeros(*size as usize)
                }
            },
            Encoding::Float {
                size,
                byte_order,
                calibration,
            } => {
                let limit = if *size == 32 {
                    f64::from(f32::MAX)
                } else {
                    f64::MAX
                };
                let domain = (-limit as i128, limit as i128);
                match self.raw_number(ty, value, form, calibration, domain, values, &mut warnings) {
                    Some(number) => {
                        let f = number.as_f64();
                        if f.is_finite() && f.abs() > limit {
                            warnings.push(format!(
                                "IEEE754_1985 encoding value for item {} is {f}, which is {} the {} value {}",
                                self.name,
                                if f > 0.0 { "greater than" } else { "less than" },
                                if f > 0.0 { "maximum" } else { "minimum" },
                                if f > 0.0 { limit } else { -limit },
                            ));
                        }
                        let bits = if *size == 32 {
                            RawBits::from_uint(u64::from((f as f32).to_bits()), 32)
                        } else {
                            RawBits::from_uint(f.to_bits(), 64)
                        };
                        reorder(bits, *byte_order)
                    }
                    None => {
                        invalid(&mut warnings);
                        RawBits::zeros(*size as usize)
                    }
                }
            }
            Encoding::String { charset, size } => {
                self.encode_string(value, *charset, size, values, &mut warnings)
            }
            Encoding::Binary { size } => match RawBits::from_hex(value) {
                Ok(bits) => {
                    let declared = match size {
                        BinarySize::Fixed(n) => Some(*n as usize),
                        BinarySize::Dynamic(dv) => dv.evaluate(values).map(|n| n as usize),
                    };
                    match declared {
                        Some(declared) => {
                            let significant = bits.len()
                                - (0..bits.len()).take_while(|i| !bits.get(*i)).count();
                            if significant > declared {
                                warnings.push(overflow_warning(&self.name, significant, declared));
                            }
                            bits.low_bits(declared)
                        }
                        None => bits,
                    }
                }
                Err(_) => {
                    invalid(&mut warnings);
                    RawBits::zeros(self.size_in_bits(values).unwrap_or(0))
                }
            },
            Encoding::Timecode(format) => {
                match Epoch::from_str(value.trim()).map_err(|e| e.to_string()).and_then(|epoch| {
                    timecode::encode(format, epoch).map_err(|e| e.to_string())
                }) {
                    Ok(bytes) => RawBits::from(bytes),
                    Err(_) => {
                        invalid(&mut warnings);
                        RawBits::zeros(format.size_in_bits())
                    }
                }
            }
        };

        trace!(item = %self.name, value, raw = %bits, "encoded");
        Ok(Outcome::with_warnings(bits, warnings))
    }

    /// Parse `value` and, for calibrated values, uncalibrate it to a raw number. `None` if
    /// the value cannot be parsed. Calibrator failures are warnings and encode as zero.
    #[allow(clippy::too_many_arguments)]
    fn raw_number(
        &self,
        ty: &ItemType,
        value: &str,
        form: ValueForm,
        calibration: &Calibration,
        domain: (i128, i128),
        values: &dyn ValueLookup,
        warnings: &mut Vec<String>,
    ) -> Option<Number> {
        let (eng_range, raw_range) = match &ty.valid_range {
            Some(range) if range.applies_to_calibrated => (Some(range), None),
            Some(range) => (None, Some(range)),
            None => (None, None),
        };
        let raw = if form == ValueForm::Uncalibrated {
            parse_raw(value)?
        } else {
            let eng = self.parse_engineering(ty, value, warnings)?;
            if let Some(range) = eng_range {
                self.check_valid_range(eng.as_f64(), range, warnings);
            }
            match calibration.select(values) {
                None => eng,
                Some(calibrator) => match calibrator.uncalibrate(
                    &self.name,
                    eng.as_f64(),
                    (domain.0 as f64, domain.1 as f64),
                ) {
                    Ok(raw) => Number::Float(raw),
                    Err(err) => {
                        warnings.push(err.to_string());
                        return Some(Number::Int(0));
                    }
                },
            }
        };
        if let Some(range) = raw_range {
            self.check_valid_range(raw.as_f64(), range, warnings);
        }
        Some(raw)
    }

    fn check_valid_range(&self, v: f64, range: &ValidRange, warnings: &mut Vec<String>) {
        if let Some(max) = range.max_inclusive {
            if v > max {
                warnings.push(format!(
                    "{} value {v} is greater than the valid range maximum value {max}",
                    self.name
                ));
            }
        }
        if let Some(min) = range.min_inclusive {
            if v < min {
                warnings.push(format!(
                    "{} value {v} is less than the valid range minimum value {min}",
                    self.name
                ));
            }
        }
    }

    fn parse_engineering(&self, ty: &ItemType, value: &str, warnings: &mut Vec<String>) -> Option<Number> {
        let value = value.trim();
        match &ty.eng {
            EngType::Integer { .. } => parse_integer(value).map(Number::Int).or_else(|| {
                parse_number(value)
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| Number::Int(f as i128))
            }),
            EngType::Float { .. } => parse_number(value).map(Number::Float),
            EngType::Boolean {
                zero_string,
                one_string,
            } => {
                if value.eq_ignore_ascii_case(one_string) || value.eq_ignore_ascii_case("true") {
                    Some(Number::Int(1))
                } else if value.eq_ignore_ascii_case(zero_string)
                    || value.eq_ignore_ascii_case("false")
                {
                    Some(Number::Int(0))
                } else {
                    parse_integer(value).map(|i| Number::Int(i128::from(i != 0)))
                }
            }
            EngType::Enumeration(enums) => {
                if let Some(e) = enums
                    .iter()
                    .find(|e| e.label == value)
                    .or_else(|| enums.iter().find(|e| e.label.eq_ignore_ascii_case(value)))
                {
                    return Some(Number::Int(i128::from(e.value)));
                }
                let i = parse_integer(value)?;
                if i64::try_from(i).map_or(true, |v| enum_label(enums, v).is_none()) {
                    warnings.push(format!(
                        "{} has undefined enumeration value of '{i}'",
                        self.name
                    ));
                }
                Some(Number::Int(i))
            }
            EngType::AbsoluteTime {
                epoch,
                scale,
                offset,
            } => match Epoch::from_str(value) {
                Ok(t) => Some(Number::Float(((t - *epoch).to_seconds() - offset) / scale)),
                Err(_) => parse_number(value).map(Number::Float),
            },
            _ => None,
        }
    }

    fn encode_integer(
        &self,
        raw: i128,
        kind: IntegerEncoding,
        size: u32,
        warnings: &mut Vec<String>,
    ) -> RawBits {
        let (min, max) = integer_range(kind, size);
        if raw > max {
            warnings.push(format!(
                "{} encoding value for item {} is {raw}, which is greater than the maximum value {max}",
                encoding_name(kind),
                self.name
            ));
        } else if raw < min {
            warnings.push(format!(
                "{} encoding value for item {} is {raw}, which is less than the minimum value {min}",
                encoding_name(kind),
                self.name
            ));
        }
        let bits = match kind {
            IntegerEncoding::Unsigned | IntegerEncoding::TwosComplement => raw as u64,
            IntegerEncoding::SignMagnitude => {
                let magnitude = (raw.unsigned_abs() as u64) & mask(size - 1);
                if raw < 0 {
                    (1u64 << (size - 1)) | magnitude
                } else {
                    magnitude
                }
            }
            IntegerEncoding::OnesComplement => {
                let magnitude = raw.unsigned_abs() as u64;
                if raw < 0 {
                    !magnitude & mask(size)
                } else {
                    magnitude
                }
            }
        };
        RawBits::from_uint(bits & mask(size), size as usize)
    }

    fn encode_string(
        &self,
        value: &str,
        charset: Charset,
        size: &StringSize,
        values: &dyn ValueLookup,
        warnings: &mut Vec<String>,
    ) -> RawBits {
        let mut bytes = match charset {
            Charset::Utf8 => value.as_bytes().to_vec(),
            Charset::Utf16 => value.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        };
        let fit = |mut bytes: Vec<u8>, declared: usize, warnings: &mut Vec<String>| {
            if bytes.len() * 8 > declared {
                warnings.push(overflow_warning(&self.name, bytes.len() * 8, declared));
            }
            bytes.resize(declared.div_ceil(8), 0);
            let mut bits = RawBits::from(bytes);
            bits.resize(declared);
            bits
        };
        match size {
            StringSize::Fixed(n) => fit(bytes, *n as usize, warnings),
            StringSize::Dynamic(dv) => match dv.evaluate(values) {
                Some(n) => fit(bytes, n as usize, warnings),
                None => RawBits::from(bytes),
            },
            StringSize::Terminated { terminator, max } => {
                bytes.extend_from_slice(terminator);
                match max {
                    Some(max) if bytes.len() * 8 > *max as usize => {
                        fit(bytes, *max as usize, warnings)
                    }
                    _ => RawBits::from(bytes),
                }
            }
            StringSize::LeadingSize(tag) => {
                let max = mask(*tag);
                let mut count = bytes.len() as u64;
                if count > max {
                    warnings.push(overflow_warning(
                        &self.name,
                        bytes.len() * 8,
                        max as usize * 8,
                    ));
                    count = max;
                    bytes.truncate(max as usize);
                }
                let mut bits = RawBits::from_uint(count, *tag as usize);
                bits.extend(&RawBits::from(bytes));
                bits
            }
        }
    }
}

fn char_width(charset: Charset) -> usize {
    match charset {
        Charset::Utf8 => 1,
        Charset::Utf16 => 2,
    }
}

fn decode_integer(u: u64, kind: IntegerEncoding, size: u32) -> i128 {
    let sign = size > 0 && (u >> (size - 1)) & 1 == 1;
    match kind {
        IntegerEncoding::Unsigned => i128::from(u),
        IntegerEncoding::TwosComplement => {
            let shift = 64 - size;
            i128::from(((u << shift) as i64) >> shift)
        }
        IntegerEncoding::SignMagnitude => {
            let magnitude = i128::from(u & mask(size - 1));
            // negative zero is zero
            if sign {
                -magnitude
            } else {
                magnitude
            }
        }
        IntegerEncoding::OnesComplement => {
            if sign {
                -i128::from(!u & mask(size))
            } else {
                i128::from(u)
            }
        }
    }
}

/// Parse a raw numeric literal.
fn parse_raw(value: &str) -> Option<Number> {
    parse_integer(value)
        .map(Number::Int)
        .or_else(|| parse_number(value).map(Number::Float))
}

fn enum_label(enums: &[EnumValue], value: i64) -> Option<&str> {
    enums
        .iter()
        .find(|e| value >= e.value && value <= e.max_value.unwrap_or(e.value))
        .map(|e| e.label.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoValues;
    use test_case::test_case;

    const TYPES: &str = r#"{
        "name": "T",
        "parameter_types": [
            {"name": "U11", "engineering": {"integer": {}},
             "encoding": {"integer": {"size_in_bits": 11}}, "valid_range": {"max_inclusive": 2047}},
            {"name": "SM32", "engineering": {"integer": {"signed": true}},
             "encoding": {"integer": {"size_in_bits": 32, "encoding": "signMagnitude"}}},
            {"name": "TC32", "engineering": {"integer": {"signed": true}},
             "encoding": {"integer": {"size_in_bits": 32, "encoding": "twosComplement"}}},
            {"name": "OC32", "engineering": {"integer": {"signed": true}},
             "encoding": {"integer": {"size_in_bits": 32, "encoding": "onesComplement"}}},
            {"name": "U8", "engineering": {"integer": {}},
             "encoding": {"integer": {"size_in_bits": 8}}},
            {"name": "LE16", "engineering": {"integer": {}},
             "encoding": {"integer": {"size_in_bits": 16, "byte_order": "leastSignificantByteFirst"}}},
            {"name": "F32", "engineering": {"float": {}}, "encoding": {"float": {"size_in_bits": 32}}},
            {"name": "Volts", "engineering": {"float": {}},
             "encoding": {"integer": {"size_in_bits": 16,
                "default_calibrator": {"polynomial": {"terms": [
                    {"coefficient": 0.5, "exponent": 0}, {"coefficient": 0.01, "exponent": 1}]}}}}},
            {"name": "Flag", "engineering": {"boolean": {"zero_string": "OFF", "one_string": "ON"}},
             "encoding": {"integer": {"size_in_bits": 1}}},
            {"name": "Mode", "engineering": {"enumeration": {"values": [
                {"value": 0, "label": "OFF"}, {"value": 1, "label": "SAFE"},
                {"value": 2, "max_value": 5, "label": "SCIENCE"}]}},
             "encoding": {"integer": {"size_in_bits": 8}}},
            {"name": "Name", "engineering": "string",
             "encoding": {"string": {"size": {"fixed": {"size_in_bits": 64}}}}},
            {"name": "Msg", "engineering": "string",
             "encoding": {"string": {"size": {"terminated": {}}}}},
            {"name": "Wide", "engineering": "string",
             "encoding": {"string": {"charset": "UTF-16", "size": {"leading_size": {"size_in_bits_of_size_tag": 8}}}}},
            {"name": "Blob", "engineering": "binary",
             "encoding": {"binary": {"size": {"fixed": {"size_in_bits": 24}}}}},
            {"name": "NoEnc", "engineering": {"integer": {}}},
            {"name": "Mismatch", "engineering": "string", "encoding": {"integer": {"size_in_bits": 8}}},
            {"name": "Time", "engineering": {"absolute_time": {"epoch": "UNIX"}},
             "encoding": {"integer": {"size_in_bits": 32}}},
            {"name": "Level", "engineering": {"float": {}},
             "encoding": {"integer": {"size_in_bits": 16,
                "default_calibrator": {"polynomial": {"terms": [{"coefficient": 2.0, "exponent": 1}]}}}},
             "valid_range": {"max_inclusive": 100, "applies_to_calibrated": false}}
        ],
        "parameters": [
            {"name": "APID", "type_ref": "U11"},
            {"name": "SM", "type_ref": "SM32"},
            {"name": "TC", "type_ref": "TC32"},
            {"name": "OC", "type_ref": "OC32"},
            {"name": "BYTE", "type_ref": "U8"},
            {"name": "LE", "type_ref": "LE16"},
            {"name": "FLOAT", "type_ref": "F32"},
            {"name": "VOLTS", "type_ref": "Volts"},
            {"name": "FLAG", "type_ref": "Flag"},
            {"name": "MODE", "type_ref": "Mode"},
            {"name": "NAME", "type_ref": "Name"},
            {"name": "MSG", "type_ref": "Msg"},
            {"name": "WIDE", "type_ref": "Wide"},
            {"name": "BLOB", "type_ref": "Blob"},
            {"name": "NOENC", "type_ref": "NoEnc"},
            {"name": "MISMATCH", "type_ref": "Mismatch"},
            {"name": "TIME", "type_ref": "Time"},
            {"name": "LEVEL", "type_ref": "Level"}
        ]
    }"#;

    fn db() -> Database {
        Database::from_json_str(TYPES).unwrap()
    }

    fn codec<'a>(db: &'a Database, name: &str) -> ItemCodec<'a> {
        ItemCodec::new(db, db.parameter(name).unwrap().into())
    }

    fn decode(db: &Database, name: &str, hex: &str, len: usize) -> Outcome<DecodedValue> {
        let bits = RawBits::from_hex(hex).unwrap().low_bits(len);
        codec(db, name).decode(&bits, &NoValues).unwrap()
    }

    fn encode(db: &Database, name: &str, value: &str) -> Outcome<RawBits> {
        codec(db, name)
            .encode(value, ValueForm::Calibrated, &NoValues)
            .unwrap()
    }

    #[test_case("SM", "0x80000001"; "sign magnitude")]
    #[test_case("TC", "0xffffffff"; "twos complement")]
    #[test_case("OC", "0xfffffffe"; "ones complement")]
    fn encode_negative_one(name: &str, expected: &str) {
        let db = db();
        let raw = encode(&db, name, "-1");
        assert!(raw.is_clean(), "{:?}", raw.warnings);
        assert_eq!(raw.value.to_hex(), expected);
        let back = codec(&db, name).decode(&raw.value, &NoValues).unwrap();
        assert_eq!(back.value.calibrated, Value::Signed(-1));
    }

    #[test_case("SM", "0x80000000"; "sign magnitude")]
    #[test_case("OC", "0xffffffff"; "ones complement")]
    fn negative_zero_is_zero(name: &str, hex: &str) {
        let db = db();
        let decoded = decode(&db, name, hex, 32);
        assert_eq!(decoded.value.uncalibrated, Value::Signed(0));
    }

    #[test]
    fn overflow_uses_low_order_bits() {
        let db = db();
        let decoded = decode(&db, "APID", "0x00", 11);
        assert!(decoded.is_clean());
        assert_eq!(decoded.value.calibrated, Value::Unsigned(0));

        let decoded = decode(&db, "APID", "0x8000", 16);
        assert_eq!(
            decoded.warnings,
            vec!["APID raw binary length '16' overflows raw encoding length of '11'"]
        );
        assert_eq!(decoded.value.calibrated, Value::Unsigned(0));
        assert_eq!(decoded.value.raw.len(), 11);

        let decoded = decode(&db, "APID", "0xffff", 16);
        assert_eq!(decoded.value.calibrated, Value::Unsigned(2047));
    }

    #[test]
    fn short_window_is_zero_extended() {
        let db = db();
        let decoded = decode(&db, "BYTE", "0x5", 4);
        assert!(decoded.is_clean());
        assert_eq!(decoded.value.calibrated, Value::Unsigned(5));
        assert_eq!(decoded.value.raw.len(), 8);
    }

    #[test]
    fn byte_order() {
        let db = db();
        let decoded = decode(&db, "LE", "0x3412", 16);
        assert_eq!(decoded.value.calibrated, Value::Unsigned(0x1234));
        assert_eq!(encode(&db, "LE", "0x1234").value.to_hex(), "0x3412");
    }

    #[test]
    fn encode_out_of_range_keeps_low_bits() {
        let db = db();
        let raw = encode(&db, "BYTE", "300");
        assert_eq!(
            raw.warnings,
            vec!["unsigned encoding value for item BYTE is 300, which is greater than the maximum value 255"]
        );
        assert_eq!(raw.value.to_u64(), 300 & 0xff);

        let raw = encode(&db, "BYTE", "-1");
        assert_eq!(
            raw.warnings,
            vec!["unsigned encoding value for item BYTE is -1, which is less than the minimum value 0"]
        );
    }

    #[test]
    fn encode_invalid_value() {
        let db = db();
        let raw = encode(&db, "BYTE", "abc");
        assert_eq!(
            raw.warnings,
            vec!["BYTE Invalid Integer value for uncalibrate of 'abc'"]
        );
        assert_eq!(raw.value, RawBits::zeros(8));
    }

    #[test]
    fn valid_range() {
        let db = db();
        let raw = encode(&db, "APID", "3000");
        assert_eq!(raw.warnings.len(), 2, "{:?}", raw.warnings);
        assert_eq!(
            raw.warnings[0],
            "APID value 3000 is greater than the valid range maximum value 2047"
        );
    }

    #[test]
    fn raw_valid_range() {
        let db = db();
        let level = codec(&db, "LEVEL");
        let over = ["LEVEL value 2500 is greater than the valid range maximum value 100"];

        let raw = level.encode("5000", ValueForm::Calibrated, &NoValues).unwrap();
        assert_eq!(raw.warnings, over);
        assert_eq!(raw.value.to_u64(), 2500);
        // only the raw value is limited
        let raw = level.encode("150", ValueForm::Calibrated, &NoValues).unwrap();
        assert!(raw.is_clean(), "{:?}", raw.warnings);
        assert_eq!(raw.value.to_u64(), 75);

        let raw = level.encode("2500", ValueForm::Uncalibrated, &NoValues).unwrap();
        assert_eq!(raw.warnings, over);
        let raw = level.encode("100", ValueForm::Uncalibrated, &NoValues).unwrap();
        assert!(raw.is_clean(), "{:?}", raw.warnings);
    }

    #[test_case("SM", &["-2147483647", "-5", "0", "1", "2147483647"]; "sign magnitude")]
    #[test_case("TC", &["-2147483648", "-5", "0", "7", "2147483647"]; "twos complement")]
    #[test_case("OC", &["-2147483647", "-5", "0", "7", "2147483647"]; "ones complement")]
    #[test_case("BYTE", &["0", "1", "128", "255"]; "unsigned")]
    #[test_case("LE", &["0", "1", "4660", "65535"]; "unsigned little endian")]
    fn integer_values_round_trip(name: &str, samples: &[&str]) {
        let db = db();
        let codec = codec(&db, name);
        for sample in samples {
            let raw = codec.encode(sample, ValueForm::Calibrated, &NoValues).unwrap();
            assert!(raw.is_clean(), "{sample}: {:?}", raw.warnings);
            let decoded = codec.decode(&raw.value, &NoValues).unwrap();
            assert!(decoded.is_clean(), "{sample}: {:?}", decoded.warnings);
            assert_eq!(decoded.value.calibrated.to_string(), *sample);
        }
    }

    #[test_case("SM", "0x80000005", 32)]
    #[test_case("SM", "0x7fffffff", 32)]
    #[test_case("TC", "0x80000000", 32)]
    #[test_case("TC", "0xfffffffb", 32)]
    #[test_case("OC", "0x80000000", 32)]
    #[test_case("OC", "0xfffffffa", 32)]
    #[test_case("BYTE", "0xa5", 8)]
    #[test_case("LE", "0x3412", 16)]
    fn integer_bits_round_trip(name: &str, hex: &str, len: usize) {
        let db = db();
        let decoded = decode(&db, name, hex, len);
        assert!(decoded.is_clean(), "{:?}", decoded.warnings);
        let calibrated = encode(&db, name, &decoded.value.calibrated.to_string());
        assert_eq!(calibrated.value.to_hex(), hex);
        let uncalibrated = codec(&db, name)
            .encode(
                &decoded.value.uncalibrated.to_string(),
                ValueForm::Uncalibrated,
                &NoValues,
            )
            .unwrap();
        assert_eq!(uncalibrated.value.to_hex(), hex);
    }

    #[test]
    fn float() {
        let db = db();
        let decoded = decode(&db, "FLOAT", "0x40600000", 32);
        assert_eq!(decoded.value.calibrated, Value::Float(3.5));
        assert_eq!(encode(&db, "FLOAT", "3.5").value.to_hex(), "0x40600000");
    }

    #[test]
    fn polynomial_calibration_roundtrip() {
        let db = db();
        let decoded = decode(&db, "VOLTS", "0x0af0", 16);
        // 0.5 + 0.01 * 2800
        assert!(matches!(decoded.value.calibrated, Value::Float(v) if (v - 28.5).abs() < 1e-9));
        assert_eq!(decoded.value.uncalibrated, Value::Unsigned(2800));
        assert_eq!(encode(&db, "VOLTS", "28.5").value.to_hex(), "0x0af0");
        let raw = codec(&db, "VOLTS")
            .encode("2800", ValueForm::Uncalibrated, &NoValues)
            .unwrap();
        assert_eq!(raw.value.to_hex(), "0x0af0");
    }

    #[test]
    fn boolean_and_enumeration() {
        let db = db();
        assert_eq!(decode(&db, "FLAG", "0x1", 1).value.calibrated.to_string(), "ON");
        assert_eq!(encode(&db, "FLAG", "OFF").value.to_u64(), 0);
        assert_eq!(encode(&db, "FLAG", "on").value.to_u64(), 1);

        assert_eq!(decode(&db, "MODE", "0x01", 8).value.calibrated.to_string(), "SAFE");
        assert_eq!(decode(&db, "MODE", "0x04", 8).value.calibrated.to_string(), "SCIENCE");
        let undefined = decode(&db, "MODE", "0x09", 8);
        assert_eq!(
            undefined.warnings,
            vec!["MODE has undefined enumeration value of '9'"]
        );
        assert_eq!(encode(&db, "MODE", "SAFE").value.to_u64(), 1);
        assert_eq!(encode(&db, "MODE", "2").value.to_u64(), 2);
    }

    #[test]
    fn strings() {
        let db = db();
        let raw = encode(&db, "NAME", "abc");
        assert_eq!(raw.value.to_hex(), "0x6162630000000000");
        let decoded = codec(&db, "NAME").decode(&raw.value, &NoValues).unwrap();
        assert_eq!(decoded.value.calibrated, Value::String("abc".to_string()));

        let raw = encode(&db, "NAME", "too long string");
        assert_eq!(
            raw.warnings,
            vec!["NAME raw binary length '120' overflows raw encoding length of '64'"]
        );

        let raw = encode(&db, "MSG", "hi");
        assert_eq!(raw.value.to_hex(), "0x686900");
        let c = codec(&db, "MSG");
        let stream = RawBits::from_hex("0xff68690041").unwrap();
        assert_eq!(c.measure(&stream, 8, &NoValues), Some(24));
        assert_eq!(c.measure(&RawBits::from_hex("0x6869").unwrap(), 0, &NoValues), None);
        let decoded = c.decode(&raw.value, &NoValues).unwrap();
        assert_eq!(decoded.value.calibrated.to_string(), "hi");

        let raw = encode(&db, "WIDE", "hé");
        assert_eq!(raw.value.to_hex(), "0x04006800e9");
        let c = codec(&db, "WIDE");
        assert_eq!(c.measure(&raw.value, 0, &NoValues), Some(40));
        assert_eq!(
            c.decode(&raw.value, &NoValues).unwrap().value.calibrated.to_string(),
            "hé"
        );
    }

    #[test]
    fn binary() {
        let db = db();
        let raw = encode(&db, "BLOB", "0x0102");
        assert!(raw.is_clean());
        assert_eq!(raw.value.to_hex(), "0x000102");
        let decoded = codec(&db, "BLOB").decode(&raw.value, &NoValues).unwrap();
        assert_eq!(decoded.value.calibrated.to_string(), "0x000102");

        let raw = encode(&db, "BLOB", "0x01020304");
        assert_eq!(
            raw.warnings,
            vec!["BLOB raw binary length '25' overflows raw encoding length of '24'"]
        );
    }

    #[test]
    fn absolute_time() {
        let db = db();
        let decoded = decode(&db, "TIME", "0x0000003c", 32);
        assert_eq!(
            decoded.value.calibrated,
            Value::Time(Epoch::from_unix_seconds(60.0))
        );
        let raw = encode(&db, "TIME", &decoded.value.calibrated.to_string());
        assert!(raw.is_clean(), "{:?}", raw.warnings);
        assert_eq!(raw.value.to_u64(), 60);
    }

    #[test]
    fn invalid_encodings() {
        let db = db();
        for name in ["NOENC", "MISMATCH"] {
            let c = codec(&db, name);
            assert!(!c.is_valid());
            assert!(matches!(
                c.decode(&RawBits::zeros(8), &NoValues),
                Err(Error::NoEncoding { item }) if item == name
            ));
            assert!(c.encode("1", ValueForm::Calibrated, &NoValues).is_err());
        }
        assert!(codec(&db, "APID").is_valid());
    }
}
