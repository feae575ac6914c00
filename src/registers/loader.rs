//! Loads the register dictionary ("BOD" file) from JSON.
//!
//! Accepts either an array of register records or an object keyed by
//! register address. Every record is validated here, once, so lookups
//! later never need to second-guess the data.

use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::dictionary::{RegisterDictionary, RegisterMeta, RegisterType, Scale};
use crate::utils::error::ModbusError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRegister {
    name: String,
    address: u16,
    #[serde(default)]
    access_level: Option<u8>,
    #[serde(default, alias = "readable")]
    read: Option<bool>,
    #[serde(default, alias = "writable")]
    write: Option<bool>,
    #[serde(default)]
    saved: Option<bool>,
    #[serde(default)]
    scale: Option<RawScale>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default, rename = "type")]
    register_type: Option<String>,
    #[serde(default, rename = "enum")]
    enum_labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScale {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDictionary {
    List(Vec<RawRegister>),
    Keyed(BTreeMap<String, RawRegister>),
}

impl RawRegister {
    fn into_meta(self) -> Result<RegisterMeta, ModbusError> {
        let context = |e: ModbusError| {
            ModbusError::ConfigError(format!("register {} ('{}'): {}", self.address, self.name, e))
        };

        let scale = match &self.scale {
            None => Scale::default(),
            Some(RawScale::Number(factor)) => Scale::factor(*factor).map_err(context)?,
            Some(RawScale::Text(text)) => text.parse::<Scale>().map_err(context)?,
        };

        let register_type = match &self.register_type {
            None => RegisterType::default(),
            Some(tag) => tag.parse::<RegisterType>().map_err(context)?,
        };

        let mut enum_labels = BTreeMap::new();
        for (value, label) in &self.enum_labels {
            let value: u16 = value.trim().parse().map_err(|_| {
                context(ModbusError::ConfigError(format!("enum value '{}' is not a register value", value)))
            })?;
            enum_labels.insert(value, label.clone());
        }

        Ok(RegisterMeta {
            name: self.name,
            address: self.address,
            access_level: self.access_level.unwrap_or(0),
            readable: self.read.unwrap_or(true),
            writable: self.write.unwrap_or(false),
            saved: self.saved.unwrap_or(false),
            scale,
            units: self.units.unwrap_or_default(),
            register_type,
            enum_labels,
        })
    }
}

impl RegisterDictionary {
    pub fn from_json_str(json: &str) -> Result<Self, ModbusError> {
        let raw: RawDictionary = serde_json::from_str(json)
            .map_err(|e| ModbusError::ConfigError(format!("invalid register dictionary: {}", e)))?;

        let mut dictionary = RegisterDictionary::new();
        match raw {
            RawDictionary::List(records) => {
                for record in records {
                    dictionary.insert(record.into_meta()?)?;
                }
            }
            RawDictionary::Keyed(records) => {
                for (key, record) in records {
                    let address: u16 = key.trim().parse().map_err(|_| {
                        ModbusError::ConfigError(format!("dictionary key '{}' is not a register address", key))
                    })?;
                    if address != record.address {
                        return Err(ModbusError::ConfigError(format!(
                            "dictionary key {} does not match record address {}",
                            address, record.address
                        )));
                    }
                    dictionary.insert(record.into_meta()?)?;
                }
            }
        }

        debug!("📖 Parsed {} register definitions", dictionary.len());
        Ok(dictionary)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("cannot read dictionary {}: {}", path.display(), e))
        })?;
        let dictionary = Self::from_json_str(&content)?;
        info!("📖 Loaded {} registers from {}", dictionary.len(), path.display());
        Ok(dictionary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::DecodedValue;
    use std::io::Write;

    const BOD_SAMPLE: &str = r#"[
        {"name": "Battery Voltage", "address": 258, "accessLevel": 1, "read": true,
         "write": false, "saved": false, "scale": 0.1, "units": "V", "type": null},
        {"name": "Battery Current", "address": 259, "accessLevel": 1, "read": true,
         "write": false, "saved": false, "scale": "0.1", "units": "A", "type": "signed 16bit"},
        {"name": "Controller Mode", "address": 300, "scale": 1, "units": "",
         "type": "enum", "enum": {"0": "Idle", "1": "Running"}}
    ]"#;

    #[test]
    fn test_load_record_list() {
        let dictionary = RegisterDictionary::from_json_str(BOD_SAMPLE).unwrap();
        assert_eq!(dictionary.len(), 3);

        let voltage = dictionary.lookup(258).unwrap();
        assert_eq!(voltage.name, "Battery Voltage");
        assert_eq!(voltage.access_level, 1);
        assert!(voltage.readable);
        assert_eq!(voltage.decode(1205), DecodedValue::Number(120.5));

        let current = dictionary.lookup(259).unwrap();
        assert_eq!(current.register_type, RegisterType::Signed16);
        assert_eq!(current.decode(0xFFF6), DecodedValue::Number(-1.0));

        let mode = dictionary.lookup(300).unwrap();
        assert_eq!(mode.decode(1), DecodedValue::Symbol("Running".to_string()));
    }

    #[test]
    fn test_load_keyed_object() {
        let json = r#"{
            "258": {"name": "Battery Voltage", "address": 258, "scale": 0.1, "units": "V"},
            "277": {"name": "Temp", "address": 277, "scale": 1, "units": "C"}
        }"#;
        let dictionary = RegisterDictionary::from_json_str(json).unwrap();
        assert_eq!(dictionary.lookup(277).unwrap().label(), "Temp (C)");
    }

    #[test]
    fn test_rejects_mismatched_key() {
        let json = r#"{"258": {"name": "Battery Voltage", "address": 259}}"#;
        assert!(matches!(
            RegisterDictionary::from_json_str(json),
            Err(ModbusError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_metadata() {
        let duplicate = r#"[{"name": "A", "address": 1}, {"name": "B", "address": 1}]"#;
        assert!(RegisterDictionary::from_json_str(duplicate).is_err());

        let bad_scale = r#"[{"name": "A", "address": 1, "scale": "sqrt"}]"#;
        assert!(RegisterDictionary::from_json_str(bad_scale).is_err());

        let bad_type = r#"[{"name": "A", "address": 1, "type": "float64"}]"#;
        assert!(RegisterDictionary::from_json_str(bad_type).is_err());

        let bad_enum = r#"[{"name": "A", "address": 1, "type": "enum", "enum": {"x": "y"}}]"#;
        assert!(RegisterDictionary::from_json_str(bad_enum).is_err());

        assert!(RegisterDictionary::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BOD_SAMPLE.as_bytes()).unwrap();

        let dictionary = RegisterDictionary::from_file(file.path()).unwrap();
        assert!(dictionary.contains(259));

        assert!(matches!(
            RegisterDictionary::from_file("/nonexistent/BODm.json"),
            Err(ModbusError::ConfigError(_))
        ));
    }
}
