//! Machine descriptions.
//!
//! A machine is described by a JSON document naming every component,
//! the module which implements it and that module's settings.  For
//! example:
//!
//! ```json
//! {
//!   "cpus": {
//!     "core0": {
//!       "registers": { "x": { "module": "registers-x32",
//!                             "settings": { "count": 32, "zero-id": 0 } } },
//!       "forms": { "r": { "module": "rv32-r", "settings": { "register-file": "x" } } },
//!       "functors": { "op": { "module": "rv32-op" } },
//!       "executors": { "main": { "module": "in-order-executor" } },
//!       "instructions": [ { "opcode": "0x33", "form": "r", "functor": "op", "executor": "main" } ],
//!       "port": { "master": "core0-port" },
//!       "control": { "executor": "main", "settings": { "initial-pc": 4 } }
//!     }
//!   },
//!   "bus": {
//!     "masters": { "core0-port": { "slave": "top" } },
//!     "switches": { "top": { "id": 1, "default": "unmapped",
//!                            "slaves": [ { "base": 0, "size": "0x1000", "slave": "ram-gate" } ] } },
//!     "default_devices": [ "unmapped" ],
//!     "endpoints": [ "ram-gate" ]
//!   },
//!   "peripherals": {
//!     "ram": { "module": "ram", "endpoint": "ram-gate", "settings": { "size": 4096 } }
//!   }
//! }
//! ```
//!
//! Opcodes, bases and sizes may be written either as JSON numbers or
//! as strings holding a decimal or `0x`-prefixed hexadecimal number.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use base::{Address, Opcode, Settings, SwitchId};

use super::error::ConfigError;

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u32),
    Text(String),
}

fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse::<u32>(),
    };
    parsed.map_err(|e| format!("'{s}' is not a valid 32-bit number: {e}"))
}

fn number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// A component built by a named module.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDescription {
    pub module: String,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstructionDescription {
    #[serde(deserialize_with = "number")]
    pub opcode: Opcode,
    pub form: String,
    pub functor: String,
    pub executor: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortDescription {
    /// The bus master this CPU's data port sends through.
    pub master: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlDescription {
    /// The executor whose pending work holds up instruction fetch.
    pub executor: String,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpuDescription {
    #[serde(default)]
    pub registers: BTreeMap<String, ComponentDescription>,
    #[serde(default)]
    pub forms: BTreeMap<String, ComponentDescription>,
    #[serde(default)]
    pub functors: BTreeMap<String, ComponentDescription>,
    #[serde(default)]
    pub executors: BTreeMap<String, ComponentDescription>,
    #[serde(default)]
    pub instructions: Vec<InstructionDescription>,
    pub port: PortDescription,
    pub control: ControlDescription,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterDescription {
    pub slave: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDescription {
    #[serde(deserialize_with = "number")]
    pub base: Address,
    #[serde(deserialize_with = "number")]
    pub size: u32,
    pub slave: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchDescription {
    pub id: SwitchId,
    /// Receives requests which match no route, or match one
    /// misaligned.
    pub default: String,
    #[serde(default)]
    pub slaves: Vec<RouteDescription>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeDescription {
    pub slave: String,
    /// Name of a payload transform applied in both directions (see
    /// [`bus::Bridge::named_transform`]).
    #[serde(default)]
    pub transform: Option<String>,
}

/// The bus fabric.  Every name is unique across all sections, since
/// routes refer to slaves by name alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusDescription {
    #[serde(default)]
    pub masters: BTreeMap<String, MasterDescription>,
    #[serde(default)]
    pub switches: BTreeMap<String, SwitchDescription>,
    #[serde(default)]
    pub bridges: BTreeMap<String, BridgeDescription>,
    #[serde(default)]
    pub default_devices: Vec<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeripheralDescription {
    pub module: String,
    /// The bus endpoint this peripheral serves.
    pub endpoint: String,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineDescription {
    #[serde(default)]
    pub cpus: BTreeMap<String, CpuDescription>,
    #[serde(default)]
    pub bus: BusDescription,
    #[serde(default)]
    pub peripherals: BTreeMap<String, PeripheralDescription>,
}

impl MachineDescription {
    pub fn from_json_str(text: &str) -> Result<MachineDescription, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Json)
    }

    pub fn from_file(path: &Path) -> Result<MachineDescription, ConfigError> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        MachineDescription::from_json_str(&text)
    }
}

#[test]
fn test_numbers_in_hex_or_decimal() {
    assert_eq!(parse_number("0x33"), Ok(0x33));
    assert_eq!(parse_number("0X1_000"), Ok(0x1000));
    assert_eq!(parse_number("51"), Ok(51));
    assert!(parse_number("0x1_0000_0000").is_err());
    assert!(parse_number("thirty").is_err());
}

#[test]
fn test_minimal_description() {
    let text = r#"{
        "cpus": {
            "c": {
                "registers": { "x": { "module": "registers-x32", "settings": { "count": 32 } } },
                "instructions": [
                    { "opcode": 51, "form": "r", "functor": "op", "executor": "main" },
                    { "opcode": "0x13", "form": "i", "functor": "op-imm", "executor": "main" }
                ],
                "port": { "master": "m" },
                "control": { "executor": "main" }
            }
        },
        "bus": {
            "masters": { "m": { "slave": "s" } },
            "switches": { "s": { "id": 3, "default": "d",
                                 "slaves": [ { "base": "0x100", "size": 256, "slave": "e" } ] } },
            "default_devices": [ "d" ],
            "endpoints": [ "e" ]
        }
    }"#;
    let description = MachineDescription::from_json_str(text).expect("valid description");
    let cpu = &description.cpus["c"];
    assert_eq!(
        cpu.instructions.iter().map(|i| i.opcode).collect::<Vec<_>>(),
        vec![0x33, 0x13]
    );
    assert_eq!(cpu.registers["x"].settings.uint::<usize>("count"), Ok(32));
    assert!(cpu.control.settings.keys().next().is_none());
    let switch = &description.bus.switches["s"];
    assert_eq!(switch.id, 3);
    assert_eq!(
        switch.slaves,
        vec![RouteDescription {
            base: 0x100,
            size: 0x100,
            slave: "e".to_string()
        }]
    );
    assert!(description.peripherals.is_empty());
}

#[test]
fn test_unknown_fields_are_rejected() {
    let text = r#"{ "bus": { "routers": {} } }"#;
    assert!(matches!(
        MachineDescription::from_json_str(text),
        Err(ConfigError::Json(_))
    ));
}
