use std::net::IpAddr;
use std::{fs, io, process::Command};

use anyhow::{bail, Context, Result};
use clap::CommandFactory;
use log::*;
use mcstack_lib::{
    bootstrap::ScriptMode,
    cloudformation,
    config::StackConfig,
    error::Error,
    info as ec2, ranges, ssh as remote,
    stack::{Stack, DEFAULT_SECURITY_GROUP_OUTPUT, PUBLIC_IP_OUTPUT},
};
use prettytable::{cell, row, Table};

use crate::opts::{Completions, Deploy, Destroy, Info, Mcstack, Ssh, Synth, Userdata, Wait};

/// Load the config file and apply the global flags on top of it.
fn stack_config(opts: &Mcstack) -> Result<StackConfig> {
    let mut config = StackConfig::load(opts.config.as_deref())?;
    if let Some(stack) = &opts.stack {
        config.stack_name = stack.clone();
    }
    if opts.checked {
        config.server.mode = ScriptMode::Checked;
    }
    Ok(config)
}

fn compose(opts: &Mcstack) -> Result<(StackConfig, Stack)> {
    let config = stack_config(opts)?;
    let stack = Stack::compose(&config).context("invalid stack configuration")?;
    Ok((config, stack))
}

pub(crate) fn synth(opts: &Mcstack, sub: &Synth) -> Result<()> {
    let (_, stack) = compose(opts)?;
    let template = stack.template_string()?;

    match &sub.out {
        Some(path) => {
            fs::write(path, template).with_context(|| format!("Couldn't write {}", path))?;
            info!("wrote {}", path);
        }
        None => println!("{}", template),
    }
    Ok(())
}

pub(crate) fn userdata(opts: &Mcstack, sub: &Userdata) -> Result<()> {
    let (_, stack) = compose(opts)?;
    let script = &stack.instance.boot_script;

    if sub.base64 {
        println!("{}", script.to_base64());
    } else {
        print!("{}", script.render());
    }
    Ok(())
}

pub(crate) async fn plan(opts: &Mcstack) -> Result<()> {
    let (_, stack) = compose(opts)?;
    let changes = cloudformation::plan(&stack, &opts.out_dir, opts.region.as_deref()).await?;

    if changes.is_empty() {
        println!("{}: no changes", stack.name);
        return Ok(());
    }

    for change in &changes {
        println!("{}", change.display_line());
    }
    println!("{}: {} resource change(s)", stack.name, changes.len());
    Ok(())
}

pub(crate) async fn deploy(opts: &Mcstack, sub: &Deploy) -> Result<()> {
    let (config, stack) = compose(opts)?;
    let region_name = opts.region.as_deref();

    cloudformation::deploy(&stack, &opts.out_dir, region_name)?;
    let outputs = cloudformation::outputs(&stack.name, region_name)?;

    if stack.network.restrict_default_security_group {
        match outputs.get(DEFAULT_SECURITY_GROUP_OUTPUT) {
            Some(group_id) => {
                let region = ec2::region(region_name)?;
                ec2::restrict_default_security_group(group_id, region).await?;
            }
            None => warn!("stack has no {} output", DEFAULT_SECURITY_GROUP_OUTPUT),
        }
    }

    let ip = cloudformation::public_ip_of(&stack.name, &outputs)?;
    println!("{} = {}", PUBLIC_IP_OUTPUT, ip);

    // a replaced instance may come back with the same address
    if let Err(e) = remote::ssh_keygen(&ip) {
        debug!("ssh-keygen -R {}: {}", ip, e);
    }

    if sub.wait {
        remote::wait_for_service(&ip, config.access.service_port).await?;
        println!("server is accepting connections on {}:{}", ip, config.access.service_port);
    }
    Ok(())
}

pub(crate) fn output(opts: &Mcstack) -> Result<()> {
    let config = stack_config(opts)?;
    let ip = cloudformation::public_ip(&config.stack_name, opts.region.as_deref())?;
    println!("{}", ip);
    Ok(())
}

pub(crate) async fn info(opts: &Mcstack, sub: &Info) -> Result<()> {
    let config = stack_config(opts)?;
    let region = ec2::region(opts.region.as_deref())?;
    let instances = ec2::instance_info(&config.instance.name, region).await?;
    if instances.is_empty() {
        return Err(Error::NoInstance(config.instance.name).into());
    }

    if sub.json {
        let stdout = io::stdout();
        let handle = stdout.lock();
        serde_json::to_writer_pretty(handle, &instances)?;
        println!();
        return Ok(());
    }

    let mut instance_table = Table::new();
    instance_table.add_row(row![
        "Name",
        "Instance",
        "Type",
        "State",
        "Private IP",
        "Public IP"
    ]);
    for instance in instances {
        let dash = || "-".to_string();
        instance_table.add_row(row![
            instance.name,
            instance.id,
            instance.instance_type.unwrap_or_else(dash),
            instance.state.unwrap_or_else(dash),
            instance.private_ip.unwrap_or_else(dash),
            instance.public_ip.unwrap_or_else(dash)
        ]);
    }
    instance_table.printstd();
    Ok(())
}

pub(crate) fn ssh(opts: &Mcstack, sub: &Ssh) -> Result<()> {
    let config = stack_config(opts)?;
    let ip = cloudformation::public_ip(&config.stack_name, opts.region.as_deref())?;
    init_ssh(ip, sub.identity.as_deref(), sub.args.clone())
}

fn init_ssh(ip: IpAddr, key: Option<&str>, mut args: Vec<String>) -> Result<()> {
    let mut flags = remote::ssh_flags(key);
    if args.is_empty() {
        flags.push("-t".to_string());
    }
    flags.push(format!("{}@{}", remote::SSH_USER, ip));
    flags.append(&mut args);

    let mut cmd = Command::new("ssh");
    let cmd_with_args = cmd.args(flags);
    info!("cmd: {:?}", cmd_with_args);

    cmd.spawn()
        .context("ssh command failed")?
        .wait()
        .context("ssh command didn't finish?")?;
    Ok(())
}

pub(crate) async fn wait(opts: &Mcstack, sub: &Wait) -> Result<()> {
    let config = stack_config(opts)?;
    let ip = cloudformation::public_ip(&config.stack_name, opts.region.as_deref())?;

    if sub.ready {
        remote::wait_for_ssh(&ip).await?;
        remote::wait_for_ready(&ip, sub.identity.as_deref())?;
    }

    let port = sub.port.unwrap_or(config.access.service_port);
    remote::wait_for_service(&ip, port).await?;
    println!("{}:{} is up", ip, port);
    Ok(())
}

pub(crate) async fn ranges(opts: &Mcstack) -> Result<()> {
    let config = stack_config(opts)?;
    let region = ec2::region(opts.region.as_deref())?;
    let configured = mcstack_lib::config::parse_cidr(&config.access.maintenance_cidr)?;

    let published = ranges::fetch().await?;
    let current = ranges::service_ranges(&published, ranges::INSTANCE_CONNECT, region.name());
    let first = ranges::instance_connect_range(&published, region.name())?;

    if ranges::is_current(&configured, &current) {
        println!("{} covers the EC2 Instance Connect range of {}", configured, region.name());
        Ok(())
    } else {
        bail!(
            "maintenance block {} is stale: AWS publishes {} for {}",
            configured,
            first,
            region.name()
        )
    }
}

pub(crate) fn destroy(opts: &Mcstack, sub: &Destroy) -> Result<()> {
    let config = stack_config(opts)?;
    if !sub.yes {
        bail!(
            "this deletes {} and the server's disk; pass --yes to continue",
            config.stack_name
        );
    }
    cloudformation::destroy(&config.stack_name, opts.region.as_deref())?;
    println!("{} deleted", config.stack_name);
    Ok(())
}

pub(crate) fn completions(sub: &Completions) -> Result<()> {
    let mut app = Mcstack::command();
    clap_complete::generate(sub.shell, &mut app, "mcstack", &mut io::stdout());
    Ok(())
}
