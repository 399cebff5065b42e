use super::client::{ListQuery, XoClient};
use super::error::{Result, XoError};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_VM_FIELDS: &[&str] = &[
    "id",
    "name_label",
    "name_description",
    "power_state",
    "CPUs",
    "memory",
];

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Running,
    Halted,
    Paused,
    Suspended,
}

impl PowerState {
    pub const NAMES: &'static [&'static str] = &["Running", "Halted", "Paused", "Suspended"];

    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Running => "Running",
            PowerState::Halted => "Halted",
            PowerState::Paused => "Paused",
            PowerState::Suspended => "Suspended",
        }
    }

    /// The VM action that drives a VM into this state.
    pub fn action(self) -> &'static str {
        match self {
            PowerState::Running => "start",
            PowerState::Halted => "clean_shutdown",
            PowerState::Paused => "pause",
            PowerState::Suspended => "suspend",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewVm {
    pub name_label: String,
    pub template: String,
    #[serde(rename = "CPUs")]
    pub cpus: u64,
    /// Bytes.
    pub memory: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot: Option<bool>,
}

impl NewVm {
    pub fn new(name: &str, template: &str, cpus: u64, memory_mb: u64) -> Self {
        Self {
            name_label: name.to_string(),
            template: template.to_string(),
            cpus,
            memory: memory_mb.saturating_mul(MIB),
            name_description: None,
            boot: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VmChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_description: Option<String>,
    #[serde(rename = "CPUs", skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
}

impl VmChanges {
    pub fn is_empty(&self) -> bool {
        self.name_label.is_none()
            && self.name_description.is_none()
            && self.cpus.is_none()
            && self.memory.is_none()
    }

    pub fn set_memory_mb(&mut self, memory_mb: u64) {
        self.memory = Some(memory_mb.saturating_mul(MIB));
    }

    /// Names of the attributes this change set touches.
    pub fn touched(&self) -> Vec<&'static str> {
        let mut touched = Vec::new();
        if self.name_label.is_some() {
            touched.push("name_label");
        }
        if self.name_description.is_some() {
            touched.push("name_description");
        }
        if self.cpus.is_some() {
            touched.push("CPUs");
        }
        if self.memory.is_some() {
            touched.push("memory");
        }
        touched
    }
}

/// Point-in-time view of a VM as relayed to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    #[serde(
        default,
        rename(deserialize = "CPUs"),
        deserialize_with = "cpu_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub cpus: Option<u64>,
    /// Bytes.
    #[serde(
        default,
        deserialize_with = "memory_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory: Option<u64>,
}

impl VmSummary {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| XoError::Malformed(format!("VM record: {}", e)))
    }

    /// Interprets the acknowledgment of a create call.
    ///
    /// XO answers either with the VM record, a bare id, or an href ending in the id.
    pub fn from_created(body: Value, request: &NewVm) -> Result<Self> {
        if body.get("id").is_some() {
            return Self::from_value(body);
        }

        let id = body
            .as_str()
            .and_then(|s| s.rsplit('/').find(|seg| !seg.is_empty()))
            .map(str::to_string)
            .ok_or_else(|| {
                XoError::Malformed(format!("create VM response carries no id: {}", body))
            })?;

        Ok(Self {
            id,
            name_label: Some(request.name_label.clone()),
            name_description: request.name_description.clone(),
            power_state: None,
            cpus: Some(request.cpus),
            memory: Some(request.memory),
        })
    }
}

// XO reports CPUs as { "max": n, "number": n } and memory as { "size": bytes, .. }.
fn cpu_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| {
        v.as_u64()
            .or_else(|| v.get("number").and_then(Value::as_u64))
    }))
}

fn memory_size<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| v.as_u64().or_else(|| v.get("size").and_then(Value::as_u64))))
}

impl XoClient {
    pub async fn list_vms(&self, query: &ListQuery) -> Result<Vec<Value>> {
        self.list("vms", query).await
    }

    pub async fn get_vm(&self, id: &str) -> Result<VmSummary> {
        let mut url = self.endpoint(&["vms", id])?;
        url.query_pairs_mut()
            .append_pair("fields", &DEFAULT_VM_FIELDS.join(","));
        let vm: Value = self.request(Method::GET, url, None).await?;
        VmSummary::from_value(vm)
    }

    pub async fn create_vm(&self, vm: &NewVm) -> Result<VmSummary> {
        let url = self.endpoint(&["vms"])?;
        let body = serde_json::to_value(vm)?;
        let res: Value = self.request(Method::POST, url, Some(&body)).await?;
        VmSummary::from_created(res, vm)
    }

    pub async fn update_vm(&self, id: &str, changes: &VmChanges) -> Result<()> {
        let url = self.endpoint(&["vms", id])?;
        let body = serde_json::to_value(changes)?;
        let _: Value = self.request(Method::PATCH, url, Some(&body)).await?;
        Ok(())
    }

    pub async fn vm_action(&self, id: &str, action: &str) -> Result<Value> {
        let url = self.endpoint(&["vms", id, "actions", action])?;
        self.request(Method::POST, url, None).await
    }

    pub async fn delete_vm(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["vms", id])?;
        let _: Value = self.request(Method::DELETE, url, None).await?;
        Ok(())
    }
}
