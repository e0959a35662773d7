use assert_cmd::prelude::*;
use std::{env, fs, path::PathBuf, process::Command};

/// `mcstack` with no config or stack overrides leaking in from the environment.
pub fn mcstack() -> Command {
    let mut cmd = Command::cargo_bin("mcstack").expect("mcstack binary is built");
    cmd.env_remove("MCSTACK_CONFIG")
        .env_remove("MCSTACK_STACK")
        .env_remove("MCSTACK_OUT_DIR")
        .env("RUST_LOG", "off");
    cmd
}

/// Write `content` to a config file unique to `name`.
pub fn config_file(name: &str, content: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("mcstack-{}-{}.json", name, std::process::id()));
    fs::write(&path, content).expect("temp config is writable");
    path
}
