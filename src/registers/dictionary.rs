use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::ModbusError;

// Decimal places kept when rounding a scaled value.
const MAX_SCALE_DECIMALS: usize = 12;

/// How a raw register value becomes an engineering value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scale {
    /// Plain multiplier.
    Factor(f64),
    /// Fixed-point value with `fraction_bits` fractional bits (`q12` etc).
    FixedPoint { fraction_bits: u8 },
    /// Rendered as a hexadecimal symbol instead of a number.
    Hex,
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Factor(1.0)
    }
}

impl FromStr for Scale {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Ok(Scale::default());
        }
        if let Ok(factor) = name.parse::<f64>() {
            return Scale::factor(factor);
        }
        if name == "hex" {
            return Ok(Scale::Hex);
        }
        if let Some(bits) = name.strip_prefix('q') {
            let fraction_bits: u8 = bits
                .parse()
                .map_err(|_| ModbusError::ConfigError(format!("invalid fixed-point scale '{}'", s)))?;
            if fraction_bits > 16 {
                return Err(ModbusError::ConfigError(format!(
                    "fixed-point scale '{}' has more than 16 fraction bits",
                    s
                )));
            }
            return Ok(Scale::FixedPoint { fraction_bits });
        }
        Err(ModbusError::ConfigError(format!("unknown scale transform '{}'", s)))
    }
}

impl Scale {
    pub fn factor(factor: f64) -> Result<Self, ModbusError> {
        if !factor.is_finite() {
            return Err(ModbusError::ConfigError(format!("scale factor {} is not finite", factor)));
        }
        Ok(Scale::Factor(factor))
    }
}

/// Interpretation of the 16 raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterType {
    #[default]
    Unsigned16,
    Signed16,
    Bitfield,
    Enum,
}

impl FromStr for RegisterType {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        match tag.as_str() {
            "" | "u16" | "uint16" | "unsigned" | "unsigned16" | "unsigned16bit" => Ok(RegisterType::Unsigned16),
            "s16" | "i16" | "int16" | "signed" | "signed16" | "signed16bit" => Ok(RegisterType::Signed16),
            "bitfield" | "bitvector" | "bits" | "flags" => Ok(RegisterType::Bitfield),
            "enum" | "enumeration" => Ok(RegisterType::Enum),
            _ => Err(ModbusError::ConfigError(format!("unknown register type '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Integer(i64),
    Number(f64),
    Symbol(String),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Integer(value) => write!(f, "{}", value),
            DecodedValue::Number(value) => write!(f, "{}", value),
            DecodedValue::Symbol(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMeta {
    pub name: String,
    pub address: u16,
    pub access_level: u8,
    pub readable: bool,
    pub writable: bool,
    pub saved: bool,
    pub scale: Scale,
    pub units: String,
    pub register_type: RegisterType,
    pub enum_labels: BTreeMap<u16, String>,
}

impl RegisterMeta {
    pub fn new(address: u16, name: &str, scale: Scale, units: &str) -> Self {
        Self {
            name: name.to_string(),
            address,
            access_level: 0,
            readable: true,
            writable: false,
            saved: false,
            scale,
            units: units.to_string(),
            register_type: RegisterType::default(),
            enum_labels: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, register_type: RegisterType) -> Self {
        self.register_type = register_type;
        self
    }

    pub fn with_enum_labels(mut self, labels: BTreeMap<u16, String>) -> Self {
        self.enum_labels = labels;
        self
    }

    /// Column label, `"name (units)"`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.units)
    }

    pub fn decode(&self, raw: u16) -> DecodedValue {
        decode(self, raw)
    }
}

/// Type interpretation first, then scaling. Pure: equal inputs give equal outputs.
pub fn decode(meta: &RegisterMeta, raw: u16) -> DecodedValue {
    let numeric: i64 = match meta.register_type {
        RegisterType::Signed16 => raw as i16 as i64,
        RegisterType::Bitfield => return DecodedValue::Symbol(format!("0b{:016b}", raw)),
        RegisterType::Enum => {
            return match meta.enum_labels.get(&raw) {
                Some(label) => DecodedValue::Symbol(label.clone()),
                None => DecodedValue::Integer(raw as i64),
            }
        }
        RegisterType::Unsigned16 => raw as i64,
    };

    match &meta.scale {
        Scale::Factor(factor) => apply_factor(numeric, *factor),
        Scale::FixedPoint { fraction_bits } => {
            DecodedValue::Number(numeric as f64 / (1u32 << *fraction_bits) as f64)
        }
        Scale::Hex => DecodedValue::Symbol(format!("0x{:04X}", raw)),
    }
}

fn apply_factor(numeric: i64, factor: f64) -> DecodedValue {
    if factor.fract() == 0.0 && factor.abs() <= i32::MAX as f64 {
        return DecodedValue::Integer(numeric * factor as i64);
    }

    // 1205 * 0.1 is 120.50000000000001 in binary floating point;
    // round back to the precision the factor was written with.
    let scaled = numeric as f64 * factor;
    match factor_decimals(factor) {
        Some(decimals) => {
            let power = 10f64.powi(decimals as i32);
            DecodedValue::Number((scaled * power).round() / power)
        }
        None => DecodedValue::Number(scaled),
    }
}

/// Decimal places the factor was written with, or `None` past
/// `MAX_SCALE_DECIMALS`, where rounding would erase the value.
fn factor_decimals(factor: f64) -> Option<usize> {
    let text = format!("{}", factor.abs());
    let decimals = text
        .split_once('.')
        .map(|(_, fraction)| fraction.len())
        .unwrap_or(0);
    (decimals <= MAX_SCALE_DECIMALS).then_some(decimals)
}

/// Address-keyed register metadata. Never mutated once loaded.
#[derive(Debug, Clone, Default)]
pub struct RegisterDictionary {
    registers: BTreeMap<u16, RegisterMeta>,
}

impl RegisterDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registers<I>(registers: I) -> Result<Self, ModbusError>
    where
        I: IntoIterator<Item = RegisterMeta>,
    {
        let mut dictionary = Self::new();
        for meta in registers {
            dictionary.insert(meta)?;
        }
        Ok(dictionary)
    }

    pub(crate) fn insert(&mut self, meta: RegisterMeta) -> Result<(), ModbusError> {
        if self.registers.contains_key(&meta.address) {
            return Err(ModbusError::ConfigError(format!(
                "duplicate register address {} ('{}')",
                meta.address, meta.name
            )));
        }
        self.registers.insert(meta.address, meta);
        Ok(())
    }

    pub fn lookup(&self, address: u16) -> Result<&RegisterMeta, ModbusError> {
        self.registers
            .get(&address)
            .ok_or(ModbusError::UnknownRegister(address))
    }

    pub fn decode(&self, address: u16, raw: u16) -> Result<DecodedValue, ModbusError> {
        Ok(self.lookup(address)?.decode(raw))
    }

    pub fn contains(&self, address: u16) -> bool {
        self.registers.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_scaling() {
        let voltage = RegisterMeta::new(258, "Battery Voltage", Scale::Factor(0.1), "V");
        assert_eq!(voltage.decode(1205), DecodedValue::Number(120.5));
        assert_eq!(voltage.decode(83), DecodedValue::Number(8.3));

        let temp = RegisterMeta::new(277, "Temp", Scale::Factor(1.0), "C");
        assert_eq!(temp.decode(42), DecodedValue::Integer(42));

        let power = RegisterMeta::new(300, "Power", Scale::Factor(4.0), "W");
        assert_eq!(power.decode(250), DecodedValue::Integer(1000));
    }

    #[test]
    fn test_signed_interpretation() {
        let current = RegisterMeta::new(259, "Battery Current", Scale::Factor(0.1), "A")
            .with_type(RegisterType::Signed16);
        assert_eq!(current.decode(0xFFFF), DecodedValue::Number(-0.1));
        assert_eq!(current.decode(0xFF38), DecodedValue::Number(-20.0));

        let unsigned = RegisterMeta::new(259, "Raw", Scale::default(), "");
        assert_eq!(unsigned.decode(0xFFFF), DecodedValue::Integer(65535));
    }

    #[test]
    fn test_named_transforms() {
        let q12 = RegisterMeta::new(1, "Gain", "q12".parse().unwrap(), "");
        assert_eq!(q12.decode(4096), DecodedValue::Number(1.0));
        assert_eq!(q12.decode(2048), DecodedValue::Number(0.5));

        let hex = RegisterMeta::new(2, "Serial", "hex".parse().unwrap(), "");
        assert_eq!(hex.decode(0x04B5), DecodedValue::Symbol("0x04B5".to_string()));
    }

    #[test]
    fn test_bitfield_and_enum() {
        let faults = RegisterMeta::new(3, "Faults", Scale::default(), "")
            .with_type(RegisterType::Bitfield);
        assert_eq!(
            faults.decode(0b101),
            DecodedValue::Symbol("0b0000000000000101".to_string())
        );

        let mut labels = BTreeMap::new();
        labels.insert(0, "Idle".to_string());
        labels.insert(1, "Running".to_string());
        let mode = RegisterMeta::new(4, "Mode", Scale::default(), "")
            .with_type(RegisterType::Enum)
            .with_enum_labels(labels);
        assert_eq!(mode.decode(1), DecodedValue::Symbol("Running".to_string()));
        assert_eq!(mode.decode(9), DecodedValue::Integer(9));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let meta = RegisterMeta::new(258, "Battery Voltage", Scale::Factor(0.01), "V")
            .with_type(RegisterType::Signed16);
        for raw in [0u16, 1, 1205, 0x7FFF, 0x8000, 0xFFFF] {
            assert_eq!(decode(&meta, raw), decode(&meta, raw));
        }
    }

    #[test]
    fn test_tiny_factor_is_not_rounded_away() {
        let meta = RegisterMeta::new(5, "Leakage", Scale::Factor(1e-13), "A");
        match meta.decode(5) {
            DecodedValue::Number(value) => {
                assert!(value > 0.0);
                assert!((value - 5e-13).abs() < 1e-24);
            }
            other => panic!("unexpected value: {:?}", other),
        }

        let fine = RegisterMeta::new(6, "Fine", Scale::Factor(0.000001), "V");
        assert_eq!(fine.decode(1205), DecodedValue::Number(0.001205));
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("0.1".parse::<Scale>().unwrap(), Scale::Factor(0.1));
        assert_eq!("".parse::<Scale>().unwrap(), Scale::Factor(1.0));
        assert_eq!("Q8".parse::<Scale>().unwrap(), Scale::FixedPoint { fraction_bits: 8 });
        assert!("q99".parse::<Scale>().is_err());
        assert!("log".parse::<Scale>().is_err());
        assert!(Scale::factor(f64::NAN).is_err());
    }

    #[test]
    fn test_register_type_parsing() {
        assert_eq!("signed 16bit".parse::<RegisterType>().unwrap(), RegisterType::Signed16);
        assert_eq!("bit vector".parse::<RegisterType>().unwrap(), RegisterType::Bitfield);
        assert_eq!("".parse::<RegisterType>().unwrap(), RegisterType::Unsigned16);
        assert!("float32".parse::<RegisterType>().is_err());
    }

    #[test]
    fn test_lookup_unknown_register() {
        let dictionary = RegisterDictionary::from_registers(vec![RegisterMeta::new(
            258,
            "Battery Voltage",
            Scale::Factor(0.1),
            "V",
        )])
        .unwrap();

        assert_eq!(dictionary.lookup(258).unwrap().label(), "Battery Voltage (V)");
        assert!(matches!(dictionary.lookup(259), Err(ModbusError::UnknownRegister(259))));
        assert!(matches!(dictionary.decode(1, 1), Err(ModbusError::UnknownRegister(1))));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let result = RegisterDictionary::from_registers(vec![
            RegisterMeta::new(1, "A", Scale::default(), ""),
            RegisterMeta::new(1, "B", Scale::default(), ""),
        ]);
        assert!(matches!(result, Err(ModbusError::ConfigError(_))));
    }
}
