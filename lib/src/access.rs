use std::fmt;

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::config::{parse_cidr, AccessConfig};
use crate::error::Error;

/// A stateful allow-list attached to the instance.
///
/// Rules are only ever added; egress is either wide open or empty.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroup {
    pub description: String,
    pub allow_all_outbound: bool,
    pub ingress: Vec<AccessRule>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccessRule {
    pub peer: Ipv4Net,
    pub port: Port,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Port {
    Tcp(u16),
    AllTraffic,
}

impl Port {
    /// `IpProtocol` as CloudFormation expects it
    pub fn protocol(&self) -> &'static str {
        match self {
            Port::Tcp(_) => "tcp",
            Port::AllTraffic => "-1",
        }
    }

    pub fn range(&self) -> Option<(u16, u16)> {
        match self {
            Port::Tcp(port) => Some((*port, *port)),
            Port::AllTraffic => None,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Port::Tcp(port) => write!(f, "tcp/{}", port),
            Port::AllTraffic => write!(f, "all"),
        }
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} from {}", self.port, self.peer)
    }
}

pub fn any_ipv4() -> Ipv4Net {
    Ipv4Net::default()
}

impl SecurityGroup {
    pub fn new(description: &str, allow_all_outbound: bool) -> Self {
        Self {
            description: description.to_string(),
            allow_all_outbound,
            ingress: Vec::new(),
        }
    }

    /// The three ingress rules of the game server: SSH and the game port from
    /// anywhere, everything from the maintenance block.
    pub fn for_server(config: &AccessConfig) -> Result<Self, Error> {
        let maintenance = parse_cidr(&config.maintenance_cidr)?;

        let mut group = Self::new(&config.description, true);
        group.add_ingress_rule(
            any_ipv4(),
            Port::Tcp(config.ssh_port),
            "allow ssh from anywhere",
        )?;
        group.add_ingress_rule(
            maintenance,
            Port::AllTraffic,
            &config.maintenance_description,
        )?;
        group.add_ingress_rule(
            any_ipv4(),
            Port::Tcp(config.service_port),
            "allow minecraft connection from anywhere",
        )?;
        Ok(group)
    }

    pub fn add_ingress_rule(
        &mut self,
        peer: Ipv4Net,
        port: Port,
        description: &str,
    ) -> Result<(), Error> {
        let rule = AccessRule {
            peer,
            port,
            description: description.to_string(),
        };
        if self
            .ingress
            .iter()
            .any(|existing| existing.peer == rule.peer && existing.port == rule.port)
        {
            return Err(Error::DuplicateRule(rule.to_string()));
        }
        self.ingress.push(rule);
        Ok(())
    }
}
