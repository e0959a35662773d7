use std::collections::HashMap;

use colored::*;
use serde::{Deserialize, Serialize};

/// `aws cloudformation describe-stacks`
#[derive(Deserialize, Debug)]
pub struct DescribeStacks {
    #[serde(rename = "Stacks")]
    pub stacks: Vec<StackDescription>,
}

#[derive(Deserialize, Debug)]
pub struct StackDescription {
    #[serde(rename = "StackName")]
    pub stack_name: String,
    #[serde(rename = "StackStatus")]
    pub stack_status: String,
    #[serde(rename = "Outputs", default)]
    pub outputs: Vec<StackOutput>,
}

#[derive(Deserialize, Debug)]
pub struct StackOutput {
    #[serde(rename = "OutputKey")]
    pub output_key: String,
    #[serde(rename = "OutputValue")]
    pub output_value: String,
}

impl StackDescription {
    pub fn outputs(&self) -> HashMap<String, String> {
        self.outputs
            .iter()
            .map(|output| (output.output_key.clone(), output.output_value.clone()))
            .collect()
    }
}

/// `aws cloudformation create-change-set`
#[derive(Deserialize, Debug)]
pub struct CreatedChangeSet {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "StackId")]
    pub stack_id: String,
}

/// `aws cloudformation describe-change-set`
#[derive(Deserialize, Debug)]
pub struct ChangeSet {
    #[serde(rename = "Status")]
    pub status: ChangeSetStatus,
    #[serde(rename = "StatusReason")]
    pub status_reason: Option<String>,
    #[serde(rename = "Changes", default)]
    pub changes: Vec<Change>,
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeSetStatus {
    CreatePending,
    CreateInProgress,
    CreateComplete,
    DeletePending,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    Failed,
}

impl ChangeSetStatus {
    pub fn is_done(&self) -> bool {
        !matches!(
            self,
            ChangeSetStatus::CreatePending | ChangeSetStatus::CreateInProgress
        )
    }
}

impl ChangeSet {
    /// CloudFormation refuses to create change sets without changes and
    /// reports it as a failure.
    pub fn is_empty(&self) -> bool {
        match self.status {
            ChangeSetStatus::CreateComplete => self.changes.is_empty(),
            ChangeSetStatus::Failed => self.status_reason.as_deref().map_or(false, |reason| {
                reason.contains("didn't contain changes") || reason.contains("No updates")
            }),
            _ => false,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct Change {
    #[serde(rename = "ResourceChange")]
    pub resource_change: ResourceChange,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ResourceChange {
    #[serde(rename = "Action")]
    pub action: ChangeAction,
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    #[serde(rename = "ResourceType")]
    pub resource_type: String,
    #[serde(rename = "Replacement")]
    pub replacement: Option<String>,
}

impl ResourceChange {
    /// One colored line per change, terraform plan style.
    pub fn display_line(&self) -> String {
        let line = format!("{} ({})", self.logical_resource_id, self.resource_type);
        match self.action {
            ChangeAction::Add => format!("{} {}", "+".green(), line.green()),
            ChangeAction::Remove => format!("{} {}", "-".red(), line.red()),
            _ => {
                let replace = match self.replacement.as_deref() {
                    Some("True") => " replacement".red().to_string(),
                    Some("Conditional") => " possible replacement".yellow().to_string(),
                    _ => String::new(),
                };
                format!("{} {}{}", "~".yellow(), line.yellow(), replace)
            }
        }
    }
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChangeAction {
    Add,
    Modify,
    Remove,
    Import,
    Dynamic,
}

/// `https://ip-ranges.amazonaws.com/ip-ranges.json`
#[derive(Deserialize, Debug)]
pub struct IpRanges {
    #[serde(rename = "syncToken")]
    pub sync_token: String,
    pub prefixes: Vec<IpPrefix>,
}

#[derive(Deserialize, Debug)]
pub struct IpPrefix {
    pub ip_prefix: String,
    pub region: String,
    pub service: String,
}

/// A running instance as shown by `mcstack info`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub id: String,
    pub name: String,
    pub instance_type: Option<String>,
    pub state: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}
