use std::net::IpAddr;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info};
use tokio::{net::TcpStream, time};

use crate::bootstrap::READY_MARKER;
use crate::config::SSH_PORT;
use crate::error::Error;
use crate::{check_cmd, sh};

/// Login user of the Amazon Linux images
pub const SSH_USER: &str = "ec2-user";

/// Forget the host key of a replaced instance that reused `ip`.
pub fn ssh_keygen(ip: &IpAddr) -> Result<()> {
    sh(execute::command_args!("ssh-keygen", "-R", ip.to_string()))?;
    Ok(())
}

/// Options shared by every ssh invocation, plus `-i <key>` when the key exists.
pub fn ssh_flags(key: Option<&str>) -> Vec<String> {
    let mut flags: Vec<String> = vec![
        "-o",
        "NumberOfPasswordPrompts=0",
        "-o",
        "ServerAliveInterval=60",
        "-o",
        "StrictHostKeyChecking=accept-new",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    if let Some(key) = key {
        if Path::new(key).is_file() {
            flags.push("-i".into());
            flags.push(key.into());
        }
    }
    flags
}

/// Block until the checked boot script has written its ready marker.
pub fn wait_for_ready(ip: &IpAddr, key: Option<&str>) -> Result<()> {
    let mut cmd = Command::new("ssh");
    cmd.args(ssh_flags(key))
        .arg(format!("{}@{}", SSH_USER, ip))
        .arg(format!(
            "until grep true {} &>/dev/null; do sleep 1; done",
            READY_MARKER
        ));
    check_cmd(&mut cmd)?;
    Ok(())
}

pub async fn wait_for_ssh(ip: &IpAddr) -> Result<()> {
    wait_for_port(ip, SSH_PORT, 10000, 120).await
}

/// Wait for the game server to accept connections after the boot script ran.
pub async fn wait_for_service(ip: &IpAddr, port: u16) -> Result<()> {
    info!("waiting for {}:{}", ip, port);
    wait_for_port(ip, port, 10000, 60).await
}

pub async fn wait_for_port(
    ip: &IpAddr,
    port: u16,
    duration_in_ms: u64,
    attempts: usize,
) -> Result<()> {
    let addr = format!("{}:{}", ip, port);
    let timeout_duration = Duration::from_millis(duration_in_ms);
    let mut interval = time::interval(timeout_duration);

    for _ in 0..attempts {
        interval.tick().await;
        let stream = TcpStream::connect(addr.clone());
        match time::timeout(timeout_duration, stream).await {
            Ok(Ok(_)) => {
                info!("{} is up", addr);
                return Ok(());
            }
            Ok(Err(e)) => debug!("error while connecting: {}", e),
            Err(e) => debug!("waiting for {} to respond: {}", addr, e),
        }
    }
    Err(Error::ExhaustedAttempts(attempts).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_wait_for_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert!(wait_for_port(&ip, port, 100, 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let err = wait_for_port(&ip, port, 10, 2).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ExhaustedAttempts(2))
        ));
    }

    #[test]
    fn test_ssh_flags_skip_missing_key() {
        let flags = ssh_flags(Some("/nonexistent/mcstack-key.pem"));
        assert!(!flags.contains(&"-i".to_string()));
        assert!(flags.contains(&"StrictHostKeyChecking=accept-new".to_string()));
    }
}
