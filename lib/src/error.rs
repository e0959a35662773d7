use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("exhausted {0} attempts")]
    ExhaustedAttempts(usize),
    #[error("connection failed")]
    ConnectionFailed(#[from] std::io::Error),
    #[error("error parsing json")]
    Serde(#[from] serde_json::Error),
    #[error("invalid CIDR block '{0}'")]
    InvalidCidr(String),
    #[error("{0} is not a private address block")]
    NotPrivate(String),
    #[error("VPC block {0} must be between /16 and /28")]
    VpcSize(String),
    #[error("subnet mask /{mask} doesn't fit into {cidr}")]
    SubnetMask { mask: u8, cidr: String },
    #[error("network {0} has no public subnet")]
    NoPublicSubnet(String),
    #[error("disk size must be positive")]
    EmptyDisk,
    #[error("duplicate ingress rule: {0}")]
    DuplicateRule(String),
    #[error("invalid stack name '{0}': use letters, digits and hyphens, starting with a letter")]
    StackName(String),
    #[error("server download URL must use https: {0}")]
    DownloadUrl(String),
    #[error("`{command}` failed: {details}")]
    Command { command: String, details: String },
    #[error("stack {stack} has no output named {output}")]
    MissingOutput { stack: String, output: String },
    #[error("no running instance named {0}")]
    NoInstance(String),
    #[error("no {service} range published for region {region}")]
    NoRange { service: String, region: String },
}
