//! First-boot script for the game server instance.
//!
//! The script is assembled from an ordered list of [`SetupStep`]s and rendered
//! in one of two modes:
//!
//! * [`ScriptMode::FireAndForget`] keeps the historic behaviour: commands run
//!   one after another with no exit code checks, and fixed sleeps stand in for
//!   "the previous command is done".
//! * [`ScriptMode::Checked`] aborts on the first failing command, reports which
//!   step failed, retries the download, and replaces the sleeps with bounded
//!   readiness checks. On success it writes [`READY_MARKER`].

use serde::{Deserialize, Serialize};

use crate::config::{ServerConfig, MINECRAFT_PORT};

pub const READY_MARKER: &str = "/var/lib/mcstack/ready";
pub const UNIT_PATH: &str = "/etc/systemd/system/minecraft.service";

const CHECKED_PRELUDE: &str = r#"set -Eeuo pipefail

current_step="prelude"
trap 'echo "mcstack: step ${current_step} failed at line ${LINENO}" >&2' ERR

begin() {
  current_step="$1"
  echo "mcstack: step $1 started"
}

finish() {
  echo "mcstack: step $1 ok"
}
"#;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptMode {
    FireAndForget,
    Checked,
}

impl Default for ScriptMode {
    fn default() -> Self {
        ScriptMode::FireAndForget
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStep {
    pub name: &'static str,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BootScript {
    mode: ScriptMode,
    steps: Vec<SetupStep>,
}

impl BootScript {
    /// The seven-step server setup; `port` is the port the server listens on.
    pub fn minecraft(config: &ServerConfig, port: u16) -> Self {
        let mode = config.mode;
        let checked = mode == ScriptMode::Checked;
        let dir = config.directory.trim_end_matches('/');
        let user = &config.user;
        let java = format!(
            "java -Xmx{m}M -Xms{m}M -jar server.jar nogui",
            m = config.memory_mb
        );

        let mut download = vec![format!("cd {}", dir)];
        if checked {
            download.push(format!(
                "curl -fsSL --retry 5 --retry-delay 3 --retry-connrefused -o server.jar {}",
                config.download_url
            ));
            if let Some(sha1) = &config.jar_sha1 {
                download.push(format!("echo \"{}  server.jar\" | sha1sum -c -", sha1));
            }
        } else {
            download.push(format!("curl -sSL -o server.jar {}", config.download_url));
        }

        let first_run = if checked {
            vec![
                // exits by itself once it has written eula.txt
                format!("{} || true", java),
                "for _ in $(seq 1 60); do [ -f eula.txt ] && break; sleep 1; done".to_string(),
                "test -f eula.txt".to_string(),
            ]
        } else {
            vec![java.clone(), "sleep 40".to_string()]
        };

        let mut eula = vec!["sed -i 's/eula=false/eula=true/' eula.txt".to_string()];
        if checked {
            eula.push("grep -q '^eula=true' eula.txt".to_string());
        }
        if port != MINECRAFT_PORT {
            eula.push(format!(
                "sed -i 's/^server-port=.*/server-port={}/' server.properties",
                port
            ));
        }

        let pause = |commands: &mut Vec<String>| {
            if !checked {
                commands.push("sleep 1".to_string());
            }
        };
        let mut helpers = vec![heredoc("start", &format!("#!/bin/bash\n{}", java))];
        helpers.push("chmod +x start".to_string());
        pause(&mut helpers);
        helpers.push(heredoc(
            "stop",
            "#!/bin/bash\nkill -9 $(ps -ef | pgrep -f \"java\")",
        ));
        helpers.push("chmod +x stop".to_string());
        pause(&mut helpers);
        helpers.push(format!("chown -R {u}:{u} {}", dir, u = user));

        let mut service = vec![
            heredoc(UNIT_PATH, &unit_file(user, dir)),
            "systemctl daemon-reload".to_string(),
            "systemctl enable minecraft.service".to_string(),
            "systemctl start minecraft.service".to_string(),
        ];
        if checked {
            let probe = format!("(exec 3<>/dev/tcp/127.0.0.1/{})", port);
            service.push(format!(
                "for _ in $(seq 1 150); do {} 2>/dev/null && break; sleep 2; done",
                probe
            ));
            service.push(probe);
        }

        let steps = vec![
            SetupStep {
                name: "install-java",
                commands: vec![format!("dnf install -y {}", config.java_package)],
            },
            SetupStep {
                name: "create-user",
                commands: vec![
                    if checked {
                        format!("id -u {u} &>/dev/null || adduser {u}", u = user)
                    } else {
                        format!("adduser {}", user)
                    },
                    format!("mkdir -p {}", dir),
                    format!("chown -R {u}:{u} {}", dir, u = user),
                ],
            },
            SetupStep {
                name: "download-server",
                commands: download,
            },
            SetupStep {
                name: "generate-defaults",
                commands: first_run,
            },
            SetupStep {
                name: "accept-eula",
                commands: eula,
            },
            SetupStep {
                name: "write-helpers",
                commands: helpers,
            },
            SetupStep {
                name: "register-service",
                commands: service,
            },
        ];

        Self { mode, steps }
    }

    pub fn mode(&self) -> ScriptMode {
        self.mode
    }

    pub fn steps(&self) -> &[SetupStep] {
        &self.steps
    }

    pub fn render(&self) -> String {
        let total = self.steps.len();
        let mut script = String::from("#!/bin/bash\n");

        if self.mode == ScriptMode::Checked {
            script.push_str(CHECKED_PRELUDE);
        }

        for (index, step) in self.steps.iter().enumerate() {
            let label = format!("{}/{} {}", index + 1, total, step.name);
            script.push('\n');
            script.push_str(&format!("# {}\n", label));
            if self.mode == ScriptMode::Checked {
                script.push_str(&format!("begin \"{}\"\n", label));
            }
            for command in &step.commands {
                script.push_str(command);
                script.push('\n');
            }
            if self.mode == ScriptMode::Checked {
                script.push_str(&format!("finish \"{}\"\n", label));
            }
        }

        if self.mode == ScriptMode::Checked {
            let parent = READY_MARKER.rsplit_once('/').map_or("/", |(dir, _)| dir);
            script.push('\n');
            script.push_str(&format!("mkdir -p {}\n", parent));
            script.push_str(&format!("echo true > {}\n", READY_MARKER));
        }

        script
    }

    /// The rendered script as EC2 expects it in `UserData`.
    pub fn to_base64(&self) -> String {
        base64::encode(self.render())
    }
}

fn heredoc(path: &str, body: &str) -> String {
    format!("cat > {} <<'EOF'\n{}\nEOF", path, body)
}

fn unit_file(user: &str, dir: &str) -> String {
    format!(
        "[Unit]
Description=Minecraft Server on start up
Wants=network-online.target
[Service]
User={user}
WorkingDirectory={dir}
ExecStart={dir}/start
StandardInput=null
[Install]
WantedBy=multi-user.target",
        user = user,
        dir = dir
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(mode: ScriptMode) -> BootScript {
        BootScript::minecraft(
            &ServerConfig {
                mode,
                ..ServerConfig::default()
            },
            MINECRAFT_PORT,
        )
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} not found in script", needle))
    }

    #[test]
    fn test_step_order() {
        let names: Vec<&str> = script(ScriptMode::FireAndForget)
            .steps()
            .iter()
            .map(|step| step.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "install-java",
                "create-user",
                "download-server",
                "generate-defaults",
                "accept-eula",
                "write-helpers",
                "register-service",
            ]
        );
    }

    #[test]
    fn test_fire_and_forget_matches_historic_sequence() {
        let rendered = script(ScriptMode::FireAndForget).render();

        assert!(rendered.starts_with("#!/bin/bash\n"));
        assert!(!rendered.contains("set -e"));
        assert!(!rendered.contains(READY_MARKER));
        assert_eq!(rendered.matches("sleep 40").count(), 1);
        assert_eq!(rendered.matches("sleep 1\n").count(), 2);

        let ordered = [
            "dnf install -y java-21-amazon-corretto-headless",
            "adduser minecraft",
            "mkdir -p /opt/minecraft/server",
            "curl -sSL -o server.jar https://",
            "java -Xmx1300M -Xms1300M -jar server.jar nogui\nsleep 40",
            "sed -i 's/eula=false/eula=true/' eula.txt",
            "cat > start <<'EOF'",
            "cat > stop <<'EOF'",
            "kill -9 $(ps -ef | pgrep -f \"java\")",
            "cat > /etc/systemd/system/minecraft.service <<'EOF'",
            "systemctl enable minecraft.service",
        ];
        let positions: Vec<usize> = ordered.iter().map(|s| position(&rendered, s)).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_unit_file() {
        let rendered = script(ScriptMode::FireAndForget).render();
        assert!(rendered.contains("User=minecraft\n"));
        assert!(rendered.contains("WorkingDirectory=/opt/minecraft/server\n"));
        assert!(rendered.contains("ExecStart=/opt/minecraft/server/start\n"));
        assert!(rendered.contains("WantedBy=multi-user.target\nEOF\n"));
    }

    #[test]
    fn test_checked_pipeline() {
        let boot = script(ScriptMode::Checked);
        let rendered = boot.render();

        assert_eq!(boot.mode(), ScriptMode::Checked);
        assert!(rendered.contains("set -Eeuo pipefail"));
        assert!(!rendered.contains("sleep 40"));
        assert!(!rendered.contains("sleep 1\n"));
        assert!(rendered.contains("curl -fsSL --retry 5"));
        assert!(rendered.contains("begin \"1/7 install-java\""));
        assert!(rendered.contains("finish \"7/7 register-service\""));
        assert!(rendered.ends_with(&format!("echo true > {}\n", READY_MARKER)));
        assert!(!rendered.contains("sha1sum"));
        assert!(rendered.contains("(exec 3<>/dev/tcp/127.0.0.1/25565)\n"));
        assert!(!rendered.contains("server-port="));
    }

    #[test]
    fn test_custom_port() {
        let boot = BootScript::minecraft(&ServerConfig::default(), 25570);
        assert!(boot
            .render()
            .contains("sed -i 's/^server-port=.*/server-port=25570/' server.properties"));
    }

    #[test]
    fn test_checked_verifies_checksum() {
        let boot = BootScript::minecraft(
            &ServerConfig {
                mode: ScriptMode::Checked,
                jar_sha1: Some("abc123".into()),
                ..ServerConfig::default()
            },
            MINECRAFT_PORT,
        );
        assert!(boot
            .render()
            .contains("echo \"abc123  server.jar\" | sha1sum -c -"));
    }

    #[test]
    fn test_base64_round_trips() {
        let boot = script(ScriptMode::FireAndForget);
        let decoded = base64::decode(boot.to_base64()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), boot.render());
    }

    #[test]
    fn test_trailing_slash_in_directory() {
        let boot = BootScript::minecraft(
            &ServerConfig {
                directory: "/srv/mc/".into(),
                ..ServerConfig::default()
            },
            MINECRAFT_PORT,
        );
        let rendered = boot.render();
        assert!(rendered.contains("ExecStart=/srv/mc/start\n"));
        assert!(!rendered.contains("/srv/mc//"));
    }
}
