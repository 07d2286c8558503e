//! Paired devices.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Phone,
    Tablet,
    Watch,
}

impl DeviceType {
    fn from_tool(value: &str) -> Option<Self> {
        match value {
            "iPhone" => Some(Self::Phone),
            "iPad" => Some(Self::Tablet),
            "appleWatch" => Some(Self::Watch),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Phone => "phone",
            Self::Tablet => "tablet",
            Self::Watch => "watch",
        })
    }
}

/// A paired device reachable over its tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Marketing model name, e.g. "iPhone 15 Pro".
    pub model: String,
    pub device_type: DeviceType,
    pub os_version: String,
    pub os_build: String,
    /// `None` when the tool reported an unparseable timestamp.
    pub last_connection: Option<DateTime<Utc>>,
}

/// Why a device record was not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRejection {
    /// The tunnel transport is unavailable.
    Unreachable,
    /// The device is not paired with this host.
    NotPaired,
    /// A required field is missing or has the wrong type.
    Malformed(&'static str),
}

impl fmt::Display for DeviceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => f.write_str("tunnel unavailable"),
            Self::NotPaired => f.write_str("not paired"),
            Self::Malformed(field) => write!(f, "missing or invalid {}", field),
        }
    }
}

impl TryFrom<&Value> for Device {
    type Error = DeviceRejection;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let connection = &value["connectionProperties"];
        let device = &value["deviceProperties"];
        let hardware = &value["hardwareProperties"];

        if connection["tunnelState"].as_str() == Some("unavailable") {
            return Err(DeviceRejection::Unreachable);
        }
        if connection["pairingState"].as_str() != Some("paired") {
            return Err(DeviceRejection::NotPaired);
        }

        let field = |v: &Value, name: &'static str| {
            v.as_str()
                .map(str::to_string)
                .ok_or(DeviceRejection::Malformed(name))
        };

        let last_connection = field(&connection["lastConnectionDate"], "lastConnectionDate")?;
        let device_type = hardware["deviceType"]
            .as_str()
            .and_then(DeviceType::from_tool)
            .ok_or(DeviceRejection::Malformed("deviceType"))?;

        Ok(Self {
            id: field(&value["identifier"], "identifier")?,
            name: field(&device["name"], "name")?,
            model: field(&hardware["marketingName"], "marketingName")?,
            device_type,
            os_version: field(&device["osVersionNumber"], "osVersionNumber")?,
            os_build: field(&device["osBuildUpdate"], "osBuildUpdate")?,
            last_connection: DateTime::parse_from_rfc3339(&last_connection)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

/// Decode every usable device, dropping the rest.
pub fn decode_devices(records: &[Value]) -> Vec<Device> {
    records
        .iter()
        .filter_map(|record| match Device::try_from(record) {
            Ok(device) => Some(device),
            Err(reason) => {
                let id = record["identifier"].as_str().unwrap_or("<unknown>");
                debug!(device = id, %reason, "Skipping device");
                None
            }
        })
        .collect()
}
