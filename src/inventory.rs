//! Device, peering, and group directory.
//!
//! Persistence proper (the relational store, migrations, audit) lives in a
//! collaborating service; this crate only needs lookups. [`DeviceDirectory`]
//! is the injected seam, and [`Inventory`] is the in-memory implementation
//! seeded from a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Address family of a target or source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Classify a target string. Presence of a colon means IPv6; this is
    /// how the device dialects themselves distinguish the two.
    pub fn of_target(target: &str) -> Self {
        if target.contains(':') {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Ipv4
        }
    }
}

/// A named local address on a device, usable as the origin of a probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAddress {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub family: AddressFamily,
    pub ip: String,
}

/// A network router reachable over SSH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    /// Network address; unique among devices.
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_user: String,
    /// Stored in the reversible encoding of [`crate::secret`].
    pub ssh_password: String,
    pub asn: u32,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub source_addresses: Vec<SourceAddress>,
}

impl Device {
    /// Resolve a source-address identity by numeric id first, then by the
    /// literal address.
    ///
    /// The error message lists the device's valid identities: operators
    /// debugging device configuration rely on that.
    pub fn resolve_source(&self, identifier: &str) -> Result<&SourceAddress> {
        if let Ok(id) = identifier.parse::<i64>() {
            if let Some(source) = self.source_addresses.iter().find(|s| s.id == id) {
                return Ok(source);
            }
        }
        if let Some(source) = self.source_addresses.iter().find(|s| s.ip == identifier) {
            return Ok(source);
        }
        Err(Error::validation(format!(
            "source address '{}' not found on {}; available: {}",
            identifier,
            self.name,
            self.available_sources()
        )))
    }

    /// Human-readable list of the device's source identities.
    pub fn available_sources(&self) -> String {
        if self.source_addresses.is_empty() {
            return "none".to_owned();
        }
        self.source_addresses
            .iter()
            .map(|s| format!("{} (id {})", s.ip, s.id))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

/// A configured BGP relationship to a remote AS, owned by one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peering {
    pub id: i64,
    pub ip: String,
    pub family: AddressFamily,
    pub remote_asn: u32,
    #[serde(default)]
    pub remote_name: Option<String>,
    pub device_id: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A named collection of peerings, all on the same device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeeringGroup {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    #[serde(default)]
    pub peering_ids: Vec<i64>,
}

/// Lookup seam between this crate and whatever persists the fleet.
pub trait DeviceDirectory: Send + Sync {
    fn device(&self, id: i64) -> Option<Device>;
    fn active_devices(&self) -> Vec<Device>;
    fn peering(&self, id: i64) -> Option<Peering>;
    fn peering_group(&self, id: i64) -> Option<PeeringGroup>;
    /// Member peerings of a group, in the group's declared order.
    fn group_peerings(&self, group: &PeeringGroup) -> Vec<Peering>;
}

/// In-memory directory seeded from a JSON inventory file.
#[derive(Debug, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    peerings: Vec<Peering>,
    #[serde(default)]
    groups: Vec<PeeringGroup>,
}

impl Inventory {
    /// Parse and validate an inventory from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let inventory: Inventory = serde_json::from_str(text)
            .map_err(|e| Error::validation(format!("invalid inventory: {e}")))?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Load an inventory file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::validation(format!("cannot read inventory {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Enforce the directory invariants: unique device hosts, peerings
    /// that reference a real device, and no cross-device group membership.
    fn validate(&self) -> Result<()> {
        let mut hosts = HashMap::new();
        for device in &self.devices {
            if let Some(other) = hosts.insert(device.host.as_str(), device.id) {
                return Err(Error::validation(format!(
                    "devices {} and {} share host {}",
                    other, device.id, device.host
                )));
            }
        }

        let device_of_peering: HashMap<i64, i64> = self
            .peerings
            .iter()
            .map(|p| (p.id, p.device_id))
            .collect();

        for peering in &self.peerings {
            if !self.devices.iter().any(|d| d.id == peering.device_id) {
                return Err(Error::validation(format!(
                    "peering {} references unknown device {}",
                    peering.id, peering.device_id
                )));
            }
        }

        for group in &self.groups {
            for peering_id in &group.peering_ids {
                match device_of_peering.get(peering_id) {
                    None => {
                        return Err(Error::validation(format!(
                            "group '{}' references unknown peering {}",
                            group.name, peering_id
                        )));
                    }
                    Some(device_id) if *device_id != group.device_id => {
                        return Err(Error::validation(format!(
                            "group '{}' mixes devices: peering {} belongs to device {}",
                            group.name, peering_id, device_id
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }

    /// Wrap into the shared handle the server state wants.
    pub fn into_shared(self) -> Arc<dyn DeviceDirectory> {
        Arc::new(self)
    }
}

impl DeviceDirectory for Inventory {
    fn device(&self, id: i64) -> Option<Device> {
        self.devices.iter().find(|d| d.id == id).cloned()
    }

    fn active_devices(&self) -> Vec<Device> {
        self.devices.iter().filter(|d| d.is_active).cloned().collect()
    }

    fn peering(&self, id: i64) -> Option<Peering> {
        self.peerings.iter().find(|p| p.id == id).cloned()
    }

    fn peering_group(&self, id: i64) -> Option<PeeringGroup> {
        self.groups.iter().find(|g| g.id == id).cloned()
    }

    fn group_peerings(&self, group: &PeeringGroup) -> Vec<Peering> {
        group
            .peering_ids
            .iter()
            .filter_map(|id| self.peering(*id))
            .collect()
    }
}
