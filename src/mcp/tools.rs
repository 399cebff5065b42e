use super::schema::{Field, FieldType, Schema};
use crate::error::ToolError;
use crate::xo::error::XoError;
use crate::xo::backup::{
    BackupMode, Compression, NewBackup, BACKUP_TYPES, DEFAULT_BACKUP_FIELDS, DEFAULT_BACKUP_TYPE,
};
use crate::xo::vm::{NewVm, PowerState, VmChanges, DEFAULT_VM_FIELDS};
use crate::xo::{ListQuery, XoClient};
use log::info;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// The operations exposed to the protocol host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ListVms,
    CreateVm,
    DeleteVm,
    ModifyVm,
    ListBackups,
    CreateBackup,
    DeleteBackup,
}

static LIST_VMS: Schema = Schema {
    fields: &[
        Field::optional(
            "power_state",
            FieldType::Enum(PowerState::NAMES),
            "Only return VMs in this power state",
        ),
        Field::optional(
            "filter",
            FieldType::StringMap,
            "Additional attribute filters, e.g. {\"name_label\": \"web-01\"}",
        ),
        Field::optional(
            "fields",
            FieldType::StringList,
            "VM attributes to return (default: id, name, description, power state, CPUs, memory)",
        ),
        Field::optional(
            "limit",
            FieldType::Integer { min: 1 },
            "Maximum number of VMs to return (default: 42)",
        ),
    ],
};

static CREATE_VM: Schema = Schema {
    fields: &[
        Field::required("template_id", FieldType::NonEmpty, "Template to instantiate"),
        Field::required("name", FieldType::NonEmpty, "Name label of the new VM"),
        Field::required("cpus", FieldType::Integer { min: 1 }, "Number of vCPUs"),
        Field::required("memory_mb", FieldType::Integer { min: 1 }, "Memory in MiB"),
        Field::optional("description", FieldType::String, "Name description"),
        Field::optional("boot", FieldType::Boolean, "Start the VM once created"),
    ],
};

static DELETE_VM: Schema = Schema {
    fields: &[Field::required("vm_id", FieldType::NonEmpty, "The VM ID")],
};

static MODIFY_VM: Schema = Schema {
    fields: &[
        Field::required("vm_id", FieldType::NonEmpty, "The VM ID"),
        Field::optional("name", FieldType::NonEmpty, "New name label"),
        Field::optional("description", FieldType::String, "New name description"),
        Field::optional("cpus", FieldType::Integer { min: 1 }, "New vCPU count"),
        Field::optional("memory_mb", FieldType::Integer { min: 1 }, "New memory in MiB"),
        Field::optional(
            "power_state",
            FieldType::Enum(PowerState::NAMES),
            "Target power state",
        ),
    ],
};

static LIST_BACKUPS: Schema = Schema {
    fields: &[
        Field::optional("vm_id", FieldType::NonEmpty, "Only return backup jobs covering this VM"),
        Field::optional(
            "type",
            FieldType::Enum(BACKUP_TYPES),
            "Backup job type (default: backup)",
        ),
        Field::optional("mode", FieldType::Enum(BackupMode::NAMES), "Only return jobs in this mode"),
        Field::optional(
            "fields",
            FieldType::StringList,
            "Backup job attributes to return (default: name, mode, type, id)",
        ),
        Field::optional(
            "limit",
            FieldType::Integer { min: 1 },
            "Maximum number of backups to return (default: 42)",
        ),
    ],
};

static CREATE_BACKUP: Schema = Schema {
    fields: &[
        Field::required("vm_id", FieldType::NonEmpty, "The VM to back up"),
        Field::required("mode", FieldType::Enum(BackupMode::NAMES), "Backup mode"),
        Field::optional("remote_id", FieldType::NonEmpty, "Target backup remote"),
        Field::optional(
            "compression",
            FieldType::Enum(Compression::NAMES),
            "Compression applied to the export",
        ),
        Field::optional(
            "retention",
            FieldType::Integer { min: 1 },
            "Number of backups to keep",
        ),
    ],
};

static DELETE_BACKUP: Schema = Schema {
    fields: &[Field::required("backup_id", FieldType::NonEmpty, "The backup ID")],
};

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::ListVms,
        Tool::CreateVm,
        Tool::DeleteVm,
        Tool::ModifyVm,
        Tool::ListBackups,
        Tool::CreateBackup,
        Tool::DeleteBackup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::ListVms => "list_vms",
            Tool::CreateVm => "create_vm",
            Tool::DeleteVm => "delete_vm",
            Tool::ModifyVm => "modify_vm",
            Tool::ListBackups => "list_backups",
            Tool::CreateBackup => "create_backup",
            Tool::DeleteBackup => "delete_backup",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::ListVms => "List VMs known to Xen Orchestra, optionally filtered",
            Tool::CreateVm => "Create a VM from a template",
            Tool::DeleteVm => "Delete a VM",
            Tool::ModifyVm => {
                "Change a VM's name, description, vCPUs or memory, and/or drive it to a power state"
            }
            Tool::ListBackups => "List backup jobs, optionally by type, mode or covered VM",
            Tool::CreateBackup => "Trigger a backup of a VM",
            Tool::DeleteBackup => "Delete a backup",
        }
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            Tool::ListVms => &LIST_VMS,
            Tool::CreateVm => &CREATE_VM,
            Tool::DeleteVm => &DELETE_VM,
            Tool::ModifyVm => &MODIFY_VM,
            Tool::ListBackups => &LIST_BACKUPS,
            Tool::CreateBackup => &CREATE_BACKUP,
            Tool::DeleteBackup => &DELETE_BACKUP,
        }
    }

    /// Runs the tool against already validated arguments.
    pub async fn invoke(
        self,
        client: &XoClient,
        args: Map<String, Value>,
    ) -> Result<Value, ToolError> {
        match self {
            Tool::ListVms => list_vms(client, parse(args)?).await,
            Tool::CreateVm => create_vm(client, parse(args)?).await,
            Tool::DeleteVm => delete_vm(client, parse(args)?).await,
            Tool::ModifyVm => modify_vm(client, parse(args)?).await,
            Tool::ListBackups => list_backups(client, parse(args)?).await,
            Tool::CreateBackup => create_backup(client, parse(args)?).await,
            Tool::DeleteBackup => delete_backup(client, parse(args)?).await,
        }
    }
}

fn parse<T: DeserializeOwned>(args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ToolError::invalid("arguments", e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ListVmsArgs {
    power_state: Option<PowerState>,
    #[serde(default)]
    filter: BTreeMap<String, String>,
    fields: Option<Vec<String>>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreateVmArgs {
    template_id: String,
    name: String,
    cpus: u64,
    memory_mb: u64,
    description: Option<String>,
    boot: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct VmIdArgs {
    vm_id: String,
}

#[derive(Debug, Deserialize)]
struct ModifyVmArgs {
    vm_id: String,
    name: Option<String>,
    description: Option<String>,
    cpus: Option<u64>,
    memory_mb: Option<u64>,
    power_state: Option<PowerState>,
}

#[derive(Debug, Deserialize)]
struct ListBackupsArgs {
    vm_id: Option<String>,
    #[serde(rename = "type")]
    job_type: Option<String>,
    mode: Option<BackupMode>,
    fields: Option<Vec<String>>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreateBackupArgs {
    vm_id: String,
    mode: BackupMode,
    remote_id: Option<String>,
    compression: Option<Compression>,
    retention: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BackupIdArgs {
    backup_id: String,
}

fn query_for(defaults: &[&str], fields: Option<Vec<String>>, limit: Option<u64>) -> ListQuery {
    let mut query = ListQuery::with_fields(defaults);
    if let Some(fields) = fields.filter(|f| !f.is_empty()) {
        query.fields = fields;
    }
    query.limit = limit;
    query
}

async fn list_vms(client: &XoClient, args: ListVmsArgs) -> Result<Value, ToolError> {
    let mut query = query_for(DEFAULT_VM_FIELDS, args.fields, args.limit);
    query.filter = args.filter.into_iter().collect();
    if let Some(state) = args.power_state {
        query.filter.retain(|(k, _)| k != "power_state");
        query
            .filter
            .push(("power_state".to_string(), state.as_str().to_string()));
    }

    let vms = client.list_vms(&query).await?;
    info!("Listed {} VMs", vms.len());
    Ok(json!({ "total": vms.len(), "vms": vms }))
}

async fn create_vm(client: &XoClient, args: CreateVmArgs) -> Result<Value, ToolError> {
    let mut request = NewVm::new(&args.name, &args.template_id, args.cpus, args.memory_mb);
    request.name_description = args.description;
    request.boot = args.boot;

    info!("Creating VM '{}' from template {}", args.name, args.template_id);
    let vm = client.create_vm(&request).await?;
    Ok(json!({ "id": vm.id, "vm": vm }))
}

async fn delete_vm(client: &XoClient, args: VmIdArgs) -> Result<Value, ToolError> {
    info!("Deleting VM {}", args.vm_id);
    client.delete_vm(&args.vm_id).await?;
    Ok(json!({ "id": args.vm_id, "deleted": true }))
}

async fn modify_vm(client: &XoClient, args: ModifyVmArgs) -> Result<Value, ToolError> {
    let mut changes = VmChanges {
        name_label: args.name,
        name_description: args.description,
        cpus: args.cpus,
        ..Default::default()
    };
    if let Some(memory_mb) = args.memory_mb {
        changes.set_memory_mb(memory_mb);
    }
    if changes.is_empty() && args.power_state.is_none() {
        return Err(ToolError::invalid(
            "changes",
            "at least one of name, description, cpus, memory_mb or power_state is required",
        ));
    }

    let mut applied: Vec<String> = Vec::new();
    if !changes.is_empty() {
        info!("Updating VM {} ({})", args.vm_id, changes.touched().join(", "));
        client.update_vm(&args.vm_id, &changes).await?;
        applied.extend(changes.touched().into_iter().map(String::from));
    }
    if let Some(state) = args.power_state {
        info!("Moving VM {} to {}", args.vm_id, state.as_str());
        client
            .vm_action(&args.vm_id, state.action())
            .await
            .map_err(|e| after(&applied, e))?;
        applied.push(format!("power_state:{}", state.as_str()));
    }

    let vm = client
        .get_vm(&args.vm_id)
        .await
        .map_err(|e| after(&applied, e))?;
    Ok(json!({ "id": args.vm_id, "applied": applied, "vm": vm }))
}

/// A failure that follows committed changes must still report them.
fn after(applied: &[String], err: XoError) -> ToolError {
    if applied.is_empty() {
        ToolError::Upstream(err)
    } else {
        ToolError::PartiallyApplied {
            source: err,
            applied: applied.to_vec(),
        }
    }
}

async fn list_backups(client: &XoClient, args: ListBackupsArgs) -> Result<Value, ToolError> {
    let mut query = query_for(DEFAULT_BACKUP_FIELDS, args.fields, args.limit);
    let job_type = args.job_type.as_deref().unwrap_or(DEFAULT_BACKUP_TYPE);
    query.filter.push(("type".to_string(), job_type.to_string()));
    if let Some(mode) = args.mode {
        query.filter.push(("mode".to_string(), mode.as_str().to_string()));
    }
    // Jobs select VMs through a pattern; the matcher searches inside it.
    if let Some(vm_id) = args.vm_id {
        query.filter.push(("vms".to_string(), vm_id));
    }

    let backups = client.list_backups(&query).await?;
    info!("Listed {} backup jobs", backups.len());
    Ok(json!({ "total": backups.len(), "backups": backups }))
}

async fn create_backup(client: &XoClient, args: CreateBackupArgs) -> Result<Value, ToolError> {
    let request = NewBackup {
        vm: args.vm_id,
        mode: args.mode,
        remote: args.remote_id,
        compression: args.compression,
        retention: args.retention,
    };

    info!("Starting backup of VM {}", request.vm);
    let job = client.create_backup(&request).await?;
    Ok(json!({ "job_id": job.job_id, "status": job.status, "vm_id": request.vm }))
}

async fn delete_backup(client: &XoClient, args: BackupIdArgs) -> Result<Value, ToolError> {
    info!("Deleting backup {}", args.backup_id);
    client.delete_backup(&args.backup_id).await?;
    Ok(json!({ "id": args.backup_id, "deleted": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_snake_case() {
        let mut names: Vec<_> = Tool::ALL.iter().map(|t| t.name()).collect();
        assert!(names
            .iter()
            .all(|n| n.chars().all(|c| c.is_ascii_lowercase() || c == '_')));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Tool::ALL.len());
    }

    #[test]
    fn test_schemas_require_identifiers() {
        let required = |tool: Tool| tool.schema().to_json()["required"].clone();
        assert_eq!(required(Tool::DeleteVm), json!(["vm_id"]));
        assert_eq!(required(Tool::ModifyVm), json!(["vm_id"]));
        assert_eq!(required(Tool::DeleteBackup), json!(["backup_id"]));
        assert_eq!(
            required(Tool::CreateVm),
            json!(["template_id", "name", "cpus", "memory_mb"])
        );
        assert_eq!(required(Tool::CreateBackup), json!(["vm_id", "mode"]));
        assert_eq!(required(Tool::ListVms), json!([]));
    }

    #[test]
    fn test_power_state_enum_is_advertised() {
        let schema = Tool::ModifyVm.schema().to_json();
        assert_eq!(
            schema["properties"]["power_state"]["enum"],
            json!(["Running", "Halted", "Paused", "Suspended"])
        );
    }

    #[test]
    fn test_list_arguments_deserialize() {
        let args = Tool::ListVms
            .schema()
            .validate(&json!({ "power_state": "Halted", "filter": { "tags": "prod" }, "limit": 5 }))
            .unwrap();
        let parsed: ListVmsArgs = parse(args).unwrap();
        assert_eq!(parsed.power_state, Some(PowerState::Halted));
        assert_eq!(parsed.filter.get("tags").map(String::as_str), Some("prod"));
        assert_eq!(parsed.limit, Some(5));
    }
}
