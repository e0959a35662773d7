use std::str::FromStr;

use anyhow::{Context, Result};
use log::info;
use rusoto_core::Region;
use rusoto_ec2::{
    DescribeInstancesRequest, DescribeSecurityGroupsRequest, Ec2, Ec2Client, Filter,
    RevokeSecurityGroupEgressRequest, RevokeSecurityGroupIngressRequest,
};

use crate::types::InstanceSummary;

/// Resolve `--region`, falling back to `AWS_DEFAULT_REGION`/`AWS_REGION`.
pub fn region(name: Option<&str>) -> Result<Region> {
    match name {
        Some(name) => {
            Region::from_str(name).with_context(|| format!("'{}' is not an AWS region", name))
        }
        None => Ok(Region::default()),
    }
}

fn filter(name: &str, values: &[&str]) -> Filter {
    Filter {
        name: Some(name.to_string()),
        values: Some(values.iter().map(|v| v.to_string()).collect()),
    }
}

/// Instances tagged `Name=<name>` that haven't been terminated.
pub async fn instance_info(name: &str, region: Region) -> Result<Vec<InstanceSummary>> {
    let client = Ec2Client::new(region);
    let request = DescribeInstancesRequest {
        filters: Some(vec![
            filter("tag:Name", &[name]),
            filter(
                "instance-state-name",
                &["pending", "running", "stopping", "stopped"],
            ),
        ]),
        ..Default::default()
    };

    let response = client
        .describe_instances(request)
        .await
        .context("Unable to fetch EC2 Instance info")?;

    Ok(response
        .reservations
        .unwrap_or_default()
        .into_iter()
        .flat_map(|reservation| reservation.instances.unwrap_or_default())
        .map(|instance| InstanceSummary {
            id: instance.instance_id.unwrap_or_default(),
            name: name.to_string(),
            instance_type: instance.instance_type,
            state: instance.state.and_then(|state| state.name),
            private_ip: instance.private_ip_address,
            public_ip: instance.public_ip_address,
        })
        .collect())
}

/// Revoke every ingress and egress rule of a VPC's default security group, so
/// nothing that falls back to it is reachable. Returns the number of revoked
/// permissions.
pub async fn restrict_default_security_group(group_id: &str, region: Region) -> Result<usize> {
    let client = Ec2Client::new(region);
    let response = client
        .describe_security_groups(DescribeSecurityGroupsRequest {
            group_ids: Some(vec![group_id.to_string()]),
            ..Default::default()
        })
        .await
        .with_context(|| format!("Unable to describe security group {}", group_id))?;

    let mut revoked = 0;
    for group in response.security_groups.unwrap_or_default() {
        let ingress = group.ip_permissions.unwrap_or_default();
        if !ingress.is_empty() {
            revoked += ingress.len();
            client
                .revoke_security_group_ingress(RevokeSecurityGroupIngressRequest {
                    group_id: Some(group_id.to_string()),
                    ip_permissions: Some(ingress),
                    ..Default::default()
                })
                .await
                .context("Unable to revoke ingress rules")?;
        }

        let egress = group.ip_permissions_egress.unwrap_or_default();
        if !egress.is_empty() {
            revoked += egress.len();
            client
                .revoke_security_group_egress(RevokeSecurityGroupEgressRequest {
                    group_id: group_id.to_string(),
                    ip_permissions: Some(egress),
                    ..Default::default()
                })
                .await
                .context("Unable to revoke egress rules")?;
        }
    }

    info!("revoked {} rules of {}", revoked, group_id);
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region() {
        assert_eq!(region(Some("ap-northeast-1")).unwrap(), Region::ApNortheast1);
        assert!(region(Some("middle-earth-1")).is_err());
    }

    #[test]
    fn test_filter() {
        let f = filter("tag:Name", &["mc-ec2"]);
        assert_eq!(f.name.as_deref(), Some("tag:Name"));
        assert_eq!(f.values, Some(vec!["mc-ec2".to_string()]));
    }
}
