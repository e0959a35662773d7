use std::collections::HashMap;
use std::fs::{create_dir_all, write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use shellexpand::tilde;
use uuid::Uuid;

use crate::error::Error;
use crate::stack::{Stack, PUBLIC_IP_OUTPUT};
use crate::types::{
    ChangeSet, ChangeSetStatus, CreatedChangeSet, DescribeStacks, ResourceChange, StackDescription,
};
use crate::{check_cmd, sh};

const CHANGE_SET_POLL_MS: u64 = 3000;
const CHANGE_SET_ATTEMPTS: usize = 100;

/// Build an `aws cloudformation ...` invocation.
pub fn aws(region: Option<&str>, args: &[&str]) -> Command {
    let mut cmd = Command::new("aws");
    cmd.arg("cloudformation").args(args);
    if let Some(region) = region {
        cmd.arg("--region").arg(region);
    }
    cmd.arg("--output").arg("json");
    cmd
}

/// Synthesize `stack` into `<dir>/<stack name>.template.json`.
pub fn write_template(stack: &Stack, dir: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(tilde(dir).to_string());
    create_dir_all(&dir).with_context(|| format!("Couldn't create {}", dir.display()))?;

    let path = dir.join(format!("{}.template.json", stack.name));
    write(&path, stack.template_string()?)
        .with_context(|| format!("Couldn't write {}", path.display()))?;
    info!("template: {}", path.display());
    Ok(path)
}

/// Current state of the stack, or `None` if it was never created.
pub fn describe(stack_name: &str, region: Option<&str>) -> Result<Option<StackDescription>> {
    match sh(aws(region, &["describe-stacks", "--stack-name", stack_name])) {
        Ok(output) => {
            let described: DescribeStacks =
                serde_json::from_str(&output).context("failed to decode describe-stacks")?;
            Ok(described.stacks.into_iter().next())
        }
        Err(Error::Command { details, .. }) if details.contains("does not exist") => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn outputs(stack_name: &str, region: Option<&str>) -> Result<HashMap<String, String>> {
    let description = describe(stack_name, region)?
        .ok_or_else(|| anyhow!("stack {} doesn't exist, run `mcstack deploy` first", stack_name))?;
    Ok(description.outputs())
}

/// The public address of the server instance, as reported after deployment.
pub fn public_ip(stack_name: &str, region: Option<&str>) -> Result<IpAddr> {
    let outputs = outputs(stack_name, region)?;
    public_ip_of(stack_name, &outputs)
}

/// Read the public address out of already fetched stack outputs.
pub fn public_ip_of(stack_name: &str, outputs: &HashMap<String, String>) -> Result<IpAddr> {
    let ip = outputs.get(PUBLIC_IP_OUTPUT).ok_or_else(|| Error::MissingOutput {
        stack: stack_name.to_string(),
        output: PUBLIC_IP_OUTPUT.to_string(),
    })?;
    ip.parse()
        .with_context(|| format!("'{}' is not a valid IP address", ip))
}

/// Compute what a deployment of `stack` would change without touching any
/// resources. An empty result means the deployed stack is up to date.
pub async fn plan(stack: &Stack, dir: &str, region: Option<&str>) -> Result<Vec<ResourceChange>> {
    let path = write_template(stack, dir)?;
    let change_set_type = match describe(&stack.name, region)? {
        Some(description) if description.stack_status != "REVIEW_IN_PROGRESS" => "UPDATE",
        _ => "CREATE",
    };

    let name = format!("mcstack-{}", Uuid::new_v4());
    let body = format!("file://{}", path.display());
    let output = sh(aws(
        region,
        &[
            "create-change-set",
            "--stack-name",
            &stack.name,
            "--change-set-name",
            &name,
            "--change-set-type",
            change_set_type,
            "--template-body",
            &body,
        ],
    ))?;
    let created: CreatedChangeSet =
        serde_json::from_str(&output).context("failed to decode create-change-set")?;
    info!("change set: {}", created.id);

    let change_set = wait_for_change_set(&created.id, region).await;

    if let Err(e) = sh(aws(region, &["delete-change-set", "--change-set-name", &created.id])) {
        warn!("couldn't delete change set {}: {}", created.id, e);
    }
    if change_set_type == "CREATE" {
        // the change set left an empty stack in REVIEW_IN_PROGRESS behind
        if let Err(e) = sh(aws(region, &["delete-stack", "--stack-name", &created.stack_id])) {
            warn!("couldn't delete placeholder stack {}: {}", created.stack_id, e);
        }
    }

    let change_set = change_set?;
    if change_set.is_empty() {
        return Ok(Vec::new());
    }
    if change_set.status == ChangeSetStatus::Failed {
        bail!(
            "change set failed: {}",
            change_set.status_reason.unwrap_or_default()
        );
    }
    Ok(change_set
        .changes
        .into_iter()
        .map(|change| change.resource_change)
        .collect())
}

async fn wait_for_change_set(id: &str, region: Option<&str>) -> Result<ChangeSet> {
    let mut interval = tokio::time::interval(Duration::from_millis(CHANGE_SET_POLL_MS));

    for _ in 0..CHANGE_SET_ATTEMPTS {
        interval.tick().await;
        let output = sh(aws(region, &["describe-change-set", "--change-set-name", id]))?;
        let change_set: ChangeSet =
            serde_json::from_str(&output).context("failed to decode describe-change-set")?;
        debug!("change set status: {:?}", change_set.status);
        if change_set.status.is_done() {
            return Ok(change_set);
        }
    }
    Err(Error::ExhaustedAttempts(CHANGE_SET_ATTEMPTS).into())
}

/// Hand the template to CloudFormation. Failed deployments are rolled back by
/// CloudFormation itself; re-deploying an unchanged stack is a no-op.
pub fn deploy(stack: &Stack, dir: &str, region: Option<&str>) -> Result<()> {
    let path = write_template(stack, dir)?;
    let path = path.display().to_string();
    check_cmd(&mut aws(
        region,
        &[
            "deploy",
            "--stack-name",
            &stack.name,
            "--template-file",
            &path,
            "--no-fail-on-empty-changeset",
        ],
    ))
    .with_context(|| format!("failed to deploy {}", stack.name))?;
    Ok(())
}

pub fn destroy(stack_name: &str, region: Option<&str>) -> Result<()> {
    check_cmd(&mut aws(region, &["delete-stack", "--stack-name", stack_name]))?;
    check_cmd(&mut aws(
        region,
        &["wait", "stack-delete-complete", "--stack-name", stack_name],
    ))
    .with_context(|| format!("{} wasn't deleted", stack_name))?;
    Ok(())
}
