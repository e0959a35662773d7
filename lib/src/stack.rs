use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use crate::access::SecurityGroup;
use crate::bootstrap::BootScript;
use crate::config::StackConfig;
use crate::error::Error;
use crate::instance::Instance;
use crate::network::Network;
use crate::template;

pub const PUBLIC_IP_OUTPUT: &str = "McServerPublicIp";
pub const DEFAULT_SECURITY_GROUP_OUTPUT: &str = "DefaultSecurityGroupId";

/// The deployable unit: network, access policy and server instance.
#[derive(Debug, Clone, Serialize)]
pub struct Stack {
    pub name: String,
    pub network: Network,
    pub instance: Instance,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Output {
    pub name: String,
    pub value: OutputValue,
}

/// Values only known once the engine has created the resources.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum OutputValue {
    InstancePublicIp,
    DefaultSecurityGroupId,
}

impl Stack {
    /// Build the definitions in dependency order: network, security group,
    /// then the instance that references both.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcstack_lib::{config::StackConfig, stack::Stack};
    ///
    /// let stack = Stack::compose(&StackConfig::default()).unwrap();
    /// assert_eq!(stack.instance.instance_type.to_string(), "t3.small");
    /// ```
    pub fn compose(config: &StackConfig) -> Result<Self, Error> {
        config.validate()?;

        let network = Network::new(&config.network)?;
        debug!("network: {} {}", network.name, network.cidr);

        let security_group = SecurityGroup::for_server(&config.access)?;
        for rule in &security_group.ingress {
            debug!("ingress: {} ({})", rule, rule.description);
        }

        let boot_script = BootScript::minecraft(&config.server, config.access.service_port);
        let instance = Instance::new(&config.instance, &network, security_group, boot_script)?;

        let mut outputs = vec![Output {
            name: PUBLIC_IP_OUTPUT.to_string(),
            value: OutputValue::InstancePublicIp,
        }];
        if network.restrict_default_security_group {
            outputs.push(Output {
                name: DEFAULT_SECURITY_GROUP_OUTPUT.to_string(),
                value: OutputValue::DefaultSecurityGroupId,
            });
        }

        info!(
            "composed stack {}: {} in {}",
            config.stack_name, instance.instance_type, network.cidr
        );

        Ok(Self {
            name: config.stack_name.clone(),
            network,
            instance,
            outputs,
        })
    }

    pub fn template(&self) -> Value {
        template::synthesize(self)
    }

    pub fn template_string(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.template())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_defaults() {
        let stack = Stack::compose(&StackConfig::default()).unwrap();

        assert_eq!(stack.name, "McStack");
        assert_eq!(stack.network.nat_gateways, 0);
        assert_eq!(stack.instance.security_group.ingress.len(), 3);
        assert_eq!(
            stack.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            vec![PUBLIC_IP_OUTPUT, DEFAULT_SECURITY_GROUP_OUTPUT]
        );
    }

    #[test]
    fn test_compose_rejects_invalid_config() {
        let mut config = StackConfig::default();
        config.access.maintenance_cidr = "3.112.23.0/40".into();
        assert!(matches!(
            Stack::compose(&config),
            Err(Error::InvalidCidr(_))
        ));
    }

    #[test]
    fn test_instance_inside_network() {
        let mut config = StackConfig::default();
        config.network.cidr = "10.8.0.0/16".into();
        let stack = Stack::compose(&config).unwrap();
        assert!(stack.network.cidr.contains(&stack.instance.subnet.cidr));
    }
}
