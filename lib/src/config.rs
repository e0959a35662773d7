use std::{fs::read_to_string, path::Path};

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shellexpand::tilde;

use crate::bootstrap::ScriptMode;
use crate::error::Error;

pub const DEFAULT_STACK_NAME: &str = "McStack";
pub const MINECRAFT_PORT: u16 = 25565;
pub const SSH_PORT: u16 = 22;

/// RFC 1918 blocks a VPC may be carved from.
const PRIVATE_BLOCKS: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];
/// AWS limits on the size of a VPC block.
pub const VPC_PREFIX_RANGE: (u8, u8) = (16, 28);

const SERVER_JAR_URL: &str =
    "https://piston-data.mojang.com/v1/objects/84194a2f286ef7c14ed7ce0090dba59902951553/server.jar";
const AL2023_PARAMETER: &str =
    "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64";

/// Everything that varies between deployments of the stack.
///
/// Every field has a default matching the stock deployment, so a config file
/// only needs the values that differ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct StackConfig {
    pub stack_name: String,
    pub network: NetworkConfig,
    pub access: AccessConfig,
    pub instance: InstanceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetworkConfig {
    pub name: String,
    pub cidr: String,
    pub subnet_name: String,
    pub subnet_mask: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct AccessConfig {
    pub description: String,
    pub ssh_port: u16,
    pub service_port: u16,
    /// Provider-assigned range for EC2 Instance Connect, see `mcstack ranges`
    pub maintenance_cidr: String,
    pub maintenance_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstanceConfig {
    pub name: String,
    pub class: String,
    pub size: String,
    pub image_parameter: String,
    pub disk: DiskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiskConfig {
    pub device_name: String,
    pub size_gb: u32,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub java_package: String,
    pub user: String,
    pub directory: String,
    pub download_url: String,
    pub jar_sha1: Option<String>,
    pub memory_mb: u32,
    pub mode: ScriptMode,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            network: NetworkConfig::default(),
            access: AccessConfig::default(),
            instance: InstanceConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "mc-vpc".into(),
            cidr: "172.16.0.0/16".into(),
            subnet_name: "Public".into(),
            subnet_mask: 24,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            description: "for a minecraft server".into(),
            ssh_port: SSH_PORT,
            service_port: MINECRAFT_PORT,
            maintenance_cidr: "3.112.23.0/29".into(),
            maintenance_description: "allow ec2 instance connect from ap-northeast-1 ip range"
                .into(),
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "mc-ec2".into(),
            class: "t3".into(),
            size: "small".into(),
            image_parameter: AL2023_PARAMETER.into(),
            disk: DiskConfig::default(),
        }
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            device_name: "/dev/xvda".into(),
            size_gb: 8,
            encrypted: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            java_package: "java-21-amazon-corretto-headless".into(),
            user: "minecraft".into(),
            directory: "/opt/minecraft/server".into(),
            download_url: SERVER_JAR_URL.into(),
            jar_sha1: None,
            memory_mb: 1300,
            mode: ScriptMode::FireAndForget,
        }
    }
}

impl StackConfig {
    /// Read a JSON config file, or fall back to the defaults when no path is given.
    ///
    /// # Examples
    ///
    /// ```
    /// let config = mcstack_lib::config::StackConfig::load(None).unwrap();
    /// assert_eq!(config.stack_name, "McStack");
    /// ```
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(path) => tilde(path).to_string(),
            None => return Ok(Self::default()),
        };

        info!("config: {}", path);
        let content = read_to_string(Path::new(&path))
            .with_context(|| format!("Couldn't read {}", path))?;
        let config: StackConfig =
            serde_json::from_str(&content).with_context(|| format!("Couldn't parse {}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_stack_name(&self.stack_name)?;

        let vpc = parse_vpc_cidr(&self.network.cidr)?;
        let mask = self.network.subnet_mask;
        if mask < vpc.prefix_len() || mask > 28 {
            return Err(Error::SubnetMask {
                mask,
                cidr: self.network.cidr.clone(),
            });
        }

        parse_cidr(&self.access.maintenance_cidr)?;

        if self.instance.disk.size_gb == 0 {
            return Err(Error::EmptyDisk);
        }

        if !self.server.download_url.starts_with("https://") {
            return Err(Error::DownloadUrl(self.server.download_url.clone()));
        }
        Ok(())
    }
}

pub fn validate_stack_name(name: &str) -> Result<(), Error> {
    let re = Regex::new("^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("stack name pattern is valid");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(Error::StackName(name.to_string()))
    }
}

/// Parse an IPv4 CIDR block; host bits are kept as written.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net, Error> {
    cidr.trim()
        .parse::<Ipv4Net>()
        .map_err(|_| Error::InvalidCidr(cidr.to_string()))
}

/// Parse a VPC block and check it lies entirely inside private address space
/// and within the sizes AWS accepts. Host bits are dropped.
pub fn parse_vpc_cidr(cidr: &str) -> Result<Ipv4Net, Error> {
    let vpc = parse_cidr(cidr)?.trunc();
    let private = PRIVATE_BLOCKS
        .iter()
        .filter_map(|block| block.parse::<Ipv4Net>().ok())
        .any(|block| block.contains(&vpc));
    if !private {
        return Err(Error::NotPrivate(cidr.to_string()));
    }

    let (shortest, longest) = VPC_PREFIX_RANGE;
    if vpc.prefix_len() < shortest || vpc.prefix_len() > longest {
        return Err(Error::VpcSize(cidr.to_string()));
    }
    Ok(vpc)
}
