use std::fmt;

use serde::Serialize;

use crate::access::SecurityGroup;
use crate::bootstrap::BootScript;
use crate::config::{DiskConfig, InstanceConfig};
use crate::error::Error;
use crate::network::{Network, Subnet};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceType {
    pub class: String,
    pub size: String,
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.size)
    }
}

/// An AMI looked up at deploy time through a public SSM parameter, so every
/// deployment gets the latest point release of the image family.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MachineImage {
    pub parameter: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiskSpec {
    pub device_name: String,
    pub size_gb: u32,
    pub encrypted: bool,
}

impl DiskSpec {
    pub fn new(config: &DiskConfig) -> Result<Self, Error> {
        if config.size_gb == 0 {
            return Err(Error::EmptyDisk);
        }
        Ok(Self {
            device_name: config.device_name.clone(),
            size_gb: config.size_gb,
            encrypted: config.encrypted,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    pub name: String,
    pub instance_type: InstanceType,
    pub image: MachineImage,
    pub subnet: Subnet,
    pub associate_public_ip: bool,
    pub security_group: SecurityGroup,
    pub disk: DiskSpec,
    pub propagate_tags_to_volume: bool,
    #[serde(skip)]
    pub boot_script: BootScript,
}

impl Instance {
    /// Place one instance into the first public subnet of `network`.
    pub fn new(
        config: &InstanceConfig,
        network: &Network,
        security_group: SecurityGroup,
        boot_script: BootScript,
    ) -> Result<Self, Error> {
        let subnet = network
            .public_subnets()
            .next()
            .cloned()
            .ok_or_else(|| Error::NoPublicSubnet(network.name.clone()))?;

        Ok(Self {
            name: config.name.clone(),
            instance_type: InstanceType {
                class: config.class.clone(),
                size: config.size.clone(),
            },
            image: MachineImage {
                parameter: config.image_parameter.clone(),
            },
            subnet,
            associate_public_ip: true,
            security_group,
            disk: DiskSpec::new(&config.disk)?,
            propagate_tags_to_volume: true,
            boot_script,
        })
    }
}
