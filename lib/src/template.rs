//! CloudFormation synthesis.
//!
//! `serde_json::Map` keeps keys sorted, so the same stack always produces the
//! same document and re-deploying it yields an empty change set.

use serde_json::{json, Map, Value};

use crate::access::{Port, SecurityGroup};
use crate::instance::Instance;
use crate::network::{Network, Visibility};
use crate::stack::{OutputValue, Stack};

pub const VPC: &str = "McVpc";
pub const INTERNET_GATEWAY: &str = "McVpcIGW";
pub const GATEWAY_ATTACHMENT: &str = "McVpcVPCGW";
pub const SECURITY_GROUP: &str = "McEc2Sg";
pub const INSTANCE: &str = "McEc2";
pub const IMAGE_PARAMETER: &str = "McEc2ImageParameter";

const FORMAT_VERSION: &str = "2010-09-09";

pub fn synthesize(stack: &Stack) -> Value {
    let mut resources = Map::new();
    network_resources(&mut resources, &stack.name, &stack.network);
    resources.insert(
        SECURITY_GROUP.to_string(),
        security_group(&stack.name, &stack.instance.security_group),
    );
    resources.insert(INSTANCE.to_string(), instance(&stack.instance, &stack.network));

    let mut outputs = Map::new();
    for output in &stack.outputs {
        let value = match output.value {
            OutputValue::InstancePublicIp => json!({ "Fn::GetAtt": [INSTANCE, "PublicIp"] }),
            OutputValue::DefaultSecurityGroupId => {
                json!({ "Fn::GetAtt": [VPC, "DefaultSecurityGroup"] })
            }
        };
        outputs.insert(output.name.clone(), json!({ "Value": value }));
    }

    json!({
        "AWSTemplateFormatVersion": FORMAT_VERSION,
        "Description": format!("{}: minecraft server on {}", stack.name, stack.instance.instance_type),
        "Parameters": {
            IMAGE_PARAMETER: {
                "Type": "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>",
                "Default": stack.instance.image.parameter,
            }
        },
        "Resources": resources,
        "Outputs": outputs,
    })
}

/// Logical id of the `index`th (zero based) subnet, e.g. `McVpcPublicSubnet1Subnet`.
pub fn subnet_id(name: &str, index: usize) -> String {
    format!("{}{}Subnet{}Subnet", VPC, name, index + 1)
}

fn route_table_id(name: &str, index: usize) -> String {
    format!("{}{}Subnet{}RouteTable", VPC, name, index + 1)
}

fn name_tag(value: &str) -> Value {
    json!([{ "Key": "Name", "Value": value }])
}

fn network_resources(resources: &mut Map<String, Value>, stack_name: &str, network: &Network) {
    resources.insert(
        VPC.to_string(),
        json!({
            "Type": "AWS::EC2::VPC",
            "Properties": {
                "CidrBlock": network.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(&network.name),
            }
        }),
    );

    if network.has_internet_access() {
        resources.insert(
            INTERNET_GATEWAY.to_string(),
            json!({
                "Type": "AWS::EC2::InternetGateway",
                "Properties": { "Tags": name_tag(&network.name) }
            }),
        );
        resources.insert(
            GATEWAY_ATTACHMENT.to_string(),
            json!({
                "Type": "AWS::EC2::VPCGatewayAttachment",
                "Properties": {
                    "VpcId": { "Ref": VPC },
                    "InternetGatewayId": { "Ref": INTERNET_GATEWAY },
                }
            }),
        );
    }

    for (index, subnet) in network.subnets.iter().enumerate() {
        let subnet_logical = subnet_id(&subnet.name, index);
        let table_logical = route_table_id(&subnet.name, index);
        let path = format!("{}/{}/{}Subnet{}", stack_name, VPC, subnet.name, index + 1);
        let public = subnet.visibility == Visibility::Public;

        resources.insert(
            subnet_logical.clone(),
            json!({
                "Type": "AWS::EC2::Subnet",
                "Properties": {
                    "VpcId": { "Ref": VPC },
                    "CidrBlock": subnet.cidr.to_string(),
                    "AvailabilityZone": { "Fn::Select": [subnet.zone_index, { "Fn::GetAZs": "" }] },
                    "MapPublicIpOnLaunch": public,
                    "Tags": name_tag(&path),
                }
            }),
        );
        resources.insert(
            table_logical.clone(),
            json!({
                "Type": "AWS::EC2::RouteTable",
                "Properties": {
                    "VpcId": { "Ref": VPC },
                    "Tags": name_tag(&path),
                }
            }),
        );
        resources.insert(
            format!("{}Association", table_logical),
            json!({
                "Type": "AWS::EC2::SubnetRouteTableAssociation",
                "Properties": {
                    "RouteTableId": { "Ref": table_logical },
                    "SubnetId": { "Ref": subnet_logical },
                }
            }),
        );
        if public {
            resources.insert(
                default_route_id(&subnet.name, index),
                json!({
                    "Type": "AWS::EC2::Route",
                    "Properties": {
                        "RouteTableId": { "Ref": table_logical },
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": { "Ref": INTERNET_GATEWAY },
                    },
                    "DependsOn": [GATEWAY_ATTACHMENT],
                }),
            );
        }
    }
}

fn default_route_id(name: &str, index: usize) -> String {
    format!("{}{}Subnet{}DefaultRoute", VPC, name, index + 1)
}

fn security_group(stack_name: &str, group: &SecurityGroup) -> Value {
    let ingress: Vec<Value> = group
        .ingress
        .iter()
        .map(|rule| {
            let mut entry = json!({
                "CidrIp": rule.peer.to_string(),
                "IpProtocol": rule.port.protocol(),
                "Description": rule.description,
            });
            if let Port::Tcp(port) = rule.port {
                entry["FromPort"] = json!(port);
                entry["ToPort"] = json!(port);
            }
            entry
        })
        .collect();

    let egress = if group.allow_all_outbound {
        json!([{
            "CidrIp": "0.0.0.0/0",
            "IpProtocol": "-1",
            "Description": "Allow all outbound traffic by default",
        }])
    } else {
        // an empty list would leave the implicit allow-all rule in place
        json!([{
            "CidrIp": "255.255.255.255/32",
            "IpProtocol": "icmp",
            "FromPort": 252,
            "ToPort": 86,
            "Description": "Disallow all traffic",
        }])
    };

    json!({
        "Type": "AWS::EC2::SecurityGroup",
        "Properties": {
            "GroupDescription": group.description,
            "VpcId": { "Ref": VPC },
            "SecurityGroupIngress": ingress,
            "SecurityGroupEgress": egress,
            "Tags": name_tag(&format!("{}/{}", stack_name, SECURITY_GROUP)),
        }
    })
}

fn instance(instance: &Instance, network: &Network) -> Value {
    let subnet_index = network
        .subnets
        .iter()
        .position(|subnet| subnet.name == instance.subnet.name)
        .unwrap_or(0);

    let mut depends_on = Vec::new();
    if network.has_internet_access() {
        depends_on.push(default_route_id(&instance.subnet.name, subnet_index));
    }

    json!({
        "Type": "AWS::EC2::Instance",
        "Properties": {
            "AvailabilityZone": { "Fn::Select": [instance.subnet.zone_index, { "Fn::GetAZs": "" }] },
            "ImageId": { "Ref": IMAGE_PARAMETER },
            "InstanceType": instance.instance_type.to_string(),
            "NetworkInterfaces": [{
                "AssociatePublicIpAddress": instance.associate_public_ip,
                "DeviceIndex": "0",
                "GroupSet": [{ "Fn::GetAtt": [SECURITY_GROUP, "GroupId"] }],
                "SubnetId": { "Ref": subnet_id(&instance.subnet.name, subnet_index) },
            }],
            "BlockDeviceMappings": [{
                "DeviceName": instance.disk.device_name,
                "Ebs": {
                    "Encrypted": instance.disk.encrypted,
                    "VolumeSize": instance.disk.size_gb,
                },
            }],
            "PropagateTagsToVolumeOnCreation": instance.propagate_tags_to_volume,
            "UserData": instance.boot_script.to_base64(),
            "Tags": name_tag(&instance.name),
        },
        "DependsOn": depends_on,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use pretty_assertions::assert_eq;

    fn template() -> Value {
        Stack::compose(&StackConfig::default()).unwrap().template()
    }

    fn of_type<'a>(template: &'a Value, kind: &str) -> Vec<&'a Value> {
        template["Resources"]
            .as_object()
            .unwrap()
            .values()
            .filter(|resource| resource["Type"] == kind)
            .collect()
    }

    #[test]
    fn test_resource_counts() {
        let template = template();

        assert_eq!(of_type(&template, "AWS::EC2::VPC").len(), 1);
        assert_eq!(of_type(&template, "AWS::EC2::Subnet").len(), 1);
        assert_eq!(of_type(&template, "AWS::EC2::NatGateway").len(), 0);
        assert_eq!(of_type(&template, "AWS::EC2::InternetGateway").len(), 1);
        assert_eq!(of_type(&template, "AWS::EC2::Route").len(), 1);
        assert_eq!(of_type(&template, "AWS::EC2::SecurityGroup").len(), 1);
        assert_eq!(of_type(&template, "AWS::EC2::Instance").len(), 1);
    }

    #[test]
    fn test_network() {
        let template = template();
        assert_eq!(
            template["Resources"][VPC]["Properties"]["CidrBlock"],
            "172.16.0.0/16"
        );

        let subnet = &template["Resources"]["McVpcPublicSubnet1Subnet"]["Properties"];
        assert_eq!(subnet["CidrBlock"], "172.16.0.0/24");
        assert_eq!(subnet["MapPublicIpOnLaunch"], true);
        assert_eq!(subnet["Tags"][0]["Value"], "McStack/McVpc/PublicSubnet1");
    }

    #[test]
    fn test_security_group_rules() {
        let template = template();
        let properties = &template["Resources"][SECURITY_GROUP]["Properties"];

        assert_eq!(
            properties["SecurityGroupIngress"],
            json!([
                {
                    "CidrIp": "0.0.0.0/0",
                    "IpProtocol": "tcp",
                    "FromPort": 22,
                    "ToPort": 22,
                    "Description": "allow ssh from anywhere",
                },
                {
                    "CidrIp": "3.112.23.0/29",
                    "IpProtocol": "-1",
                    "Description": "allow ec2 instance connect from ap-northeast-1 ip range",
                },
                {
                    "CidrIp": "0.0.0.0/0",
                    "IpProtocol": "tcp",
                    "FromPort": 25565,
                    "ToPort": 25565,
                    "Description": "allow minecraft connection from anywhere",
                },
            ])
        );
        assert_eq!(properties["SecurityGroupEgress"][0]["IpProtocol"], "-1");
        assert_eq!(properties["GroupDescription"], "for a minecraft server");
    }

    #[test]
    fn test_closed_egress() {
        let mut stack = Stack::compose(&StackConfig::default()).unwrap();
        stack.instance.security_group.allow_all_outbound = false;
        let template = stack.template();
        let egress = &template["Resources"][SECURITY_GROUP]["Properties"]["SecurityGroupEgress"];
        assert_eq!(egress[0]["CidrIp"], "255.255.255.255/32");
    }

    #[test]
    fn test_instance() {
        let template = template();
        let resource = &template["Resources"][INSTANCE];
        let properties = &resource["Properties"];

        assert_eq!(properties["InstanceType"], "t3.small");
        assert_eq!(properties["ImageId"], json!({ "Ref": IMAGE_PARAMETER }));
        assert_eq!(
            properties["NetworkInterfaces"][0]["AssociatePublicIpAddress"],
            true
        );
        assert_eq!(
            properties["BlockDeviceMappings"],
            json!([{ "DeviceName": "/dev/xvda", "Ebs": { "Encrypted": true, "VolumeSize": 8 } }])
        );
        assert_eq!(properties["PropagateTagsToVolumeOnCreation"], true);
        assert_eq!(properties["Tags"][0]["Value"], "mc-ec2");
        assert_eq!(
            resource["DependsOn"],
            json!(["McVpcPublicSubnet1DefaultRoute"])
        );

        let script = base64::decode(properties["UserData"].as_str().unwrap()).unwrap();
        assert!(String::from_utf8(script)
            .unwrap()
            .starts_with("#!/bin/bash\n"));
    }

    #[test]
    fn test_outputs() {
        let template = template();
        assert_eq!(
            template["Outputs"],
            json!({
                "McServerPublicIp": { "Value": { "Fn::GetAtt": ["McEc2", "PublicIp"] } },
                "DefaultSecurityGroupId": { "Value": { "Fn::GetAtt": ["McVpc", "DefaultSecurityGroup"] } },
            })
        );
        assert_eq!(
            template["Parameters"][IMAGE_PARAMETER]["Default"],
            "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64"
        );
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let config = StackConfig::default();
        let first = Stack::compose(&config).unwrap().template_string().unwrap();
        let second = Stack::compose(&config).unwrap().template_string().unwrap();
        assert_eq!(first, second);
    }
}
