use ipnet::Ipv4Net;
use serde::Serialize;

use crate::config::{parse_vpc_cidr, NetworkConfig};
use crate::error::Error;

/// An isolated VPC with a single public subnet.
///
/// No NAT gateways are provisioned, so instances only reach the internet
/// through a public address and the internet gateway route.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    pub name: String,
    pub cidr: Ipv4Net,
    pub subnets: Vec<Subnet>,
    pub nat_gateways: u32,
    pub max_azs: u32,
    /// strip all rules from the VPC's default security group after deploy
    pub restrict_default_security_group: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subnet {
    pub name: String,
    pub cidr: Ipv4Net,
    pub visibility: Visibility,
    /// index into the zones returned by `Fn::GetAZs`
    pub zone_index: u32,
}

/// `Network::new` only carves public subnets; `Private` ones never count
/// towards internet access.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Network {
    pub fn new(config: &NetworkConfig) -> Result<Self, Error> {
        let cidr = parse_vpc_cidr(&config.cidr)?;

        let subnet = Subnet::first_of(&config.subnet_name, cidr, config.subnet_mask)?;

        Ok(Self {
            name: config.name.clone(),
            cidr,
            subnets: vec![subnet],
            nat_gateways: 0,
            max_azs: 1,
            restrict_default_security_group: true,
        })
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets
            .iter()
            .filter(|subnet| subnet.visibility == Visibility::Public)
    }

    /// Whether the network needs an internet gateway and a default route.
    pub fn has_internet_access(&self) -> bool {
        self.public_subnets().next().is_some()
    }
}

impl Subnet {
    /// Carve the first `/mask` block out of `parent`.
    fn first_of(name: &str, parent: Ipv4Net, mask: u8) -> Result<Self, Error> {
        let mismatch = || Error::SubnetMask {
            mask,
            cidr: parent.to_string(),
        };
        if mask > 28 {
            return Err(mismatch());
        }
        let cidr = parent
            .subnets(mask)
            .map_err(|_| mismatch())?
            .next()
            .ok_or_else(mismatch)?;

        Ok(Self {
            name: name.to_string(),
            cidr,
            visibility: Visibility::Public,
            zone_index: 0,
        })
    }
}
