use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[clap(name = "mcstack", version, about = "Deploy a Minecraft server on AWS")]
pub struct Mcstack {
    #[clap(
        long,
        global = true,
        env = "MCSTACK_CONFIG",
        value_name = "FILE",
        help = "JSON file overriding the stack defaults"
    )]
    pub config: Option<String>,
    #[clap(
        long,
        global = true,
        env = "MCSTACK_STACK",
        value_name = "NAME",
        help = "The CloudFormation stack name"
    )]
    pub stack: Option<String>,
    #[clap(
        long,
        global = true,
        env = "AWS_DEFAULT_REGION",
        value_name = "REGION",
        help = "The AWS region to deploy into"
    )]
    pub region: Option<String>,
    #[clap(
        long,
        global = true,
        env = "MCSTACK_OUT_DIR",
        value_name = "DIR",
        default_value = ".mcstack",
        help = "Where synthesized templates are written"
    )]
    pub out_dir: String,
    #[clap(
        long,
        global = true,
        help = "Abort the boot script on the first failing step and replace fixed sleeps with readiness checks"
    )]
    pub checked: bool,
    #[clap(subcommand)]
    pub commands: SubCommands,
}

#[derive(Subcommand)]
pub enum SubCommands {
    Synth(Synth),
    Userdata(Userdata),
    #[clap(about = "Show what a deploy would change")]
    Plan,
    Deploy(Deploy),
    #[clap(about = "Print the public IP of the server")]
    Output,
    Info(Info),
    Ssh(Ssh),
    Wait(Wait),
    #[clap(about = "Compare the maintenance block with the published EC2 Instance Connect range")]
    Ranges,
    Destroy(Destroy),
    Completions(Completions),
}

#[derive(Parser)]
#[clap(about = "Print the CloudFormation template")]
pub struct Synth {
    #[clap(short, long, value_name = "FILE", help = "write to FILE instead of stdout")]
    pub out: Option<String>,
}

#[derive(Parser)]
#[clap(about = "Print the instance boot script")]
pub struct Userdata {
    #[clap(long, help = "encode as EC2 user data")]
    pub base64: bool,
}

#[derive(Parser)]
#[clap(about = "Create or update the stack")]
pub struct Deploy {
    #[clap(short, long, help = "wait until the server accepts connections")]
    pub wait: bool,
}

#[derive(Parser)]
#[clap(about = "Show the server instance")]
pub struct Info {
    #[clap(short, long, help = "output as JSON")]
    pub json: bool,
}

#[derive(Parser)]
#[clap(about = "SSH to the server instance")]
pub struct Ssh {
    #[clap(
        short,
        long,
        env = "MCSTACK_SSH_KEY",
        value_name = "KEY",
        help = "private key for ec2-user"
    )]
    pub identity: Option<String>,
    #[clap(multiple_values = true, help = "arguments to ssh")]
    pub args: Vec<String>,
}

#[derive(Parser)]
#[clap(about = "Wait until the server is reachable")]
pub struct Wait {
    #[clap(long, help = "port to probe instead of the configured server port")]
    pub port: Option<u16>,
    #[clap(
        long,
        help = "wait for the boot script's ready marker over ssh (requires --checked at deploy time)"
    )]
    pub ready: bool,
    #[clap(
        short,
        long,
        env = "MCSTACK_SSH_KEY",
        value_name = "KEY",
        help = "private key for ec2-user"
    )]
    pub identity: Option<String>,
}

#[derive(Parser)]
#[clap(about = "Delete the stack and everything in it")]
pub struct Destroy {
    #[clap(long, help = "confirm the deletion")]
    pub yes: bool,
}

#[derive(Parser)]
#[clap(about = "Generate shell completions")]
pub struct Completions {
    #[clap(value_enum)]
    pub shell: Shell,
}
