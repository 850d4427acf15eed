use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_FORWARD_URL: &str =
    "https://forwardstudio.co.th/rfid_event/api/server-reciver.php";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayCfg {
    #[serde(default)]
    pub receiver: ReceiverCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub forward: ForwardCfg,
    #[serde(default)]
    pub logs: LogsCfg,
    #[serde(default)]
    pub supervisor: SupervisorCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReceiverCfg {
    #[serde(default = "default_receiver_bind")]
    pub bind: SocketAddr,
}
impl Default for ReceiverCfg {
    fn default() -> Self {
        Self {
            bind: default_receiver_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ControlCfg {
    #[serde(default = "default_control_bind")]
    pub bind: SocketAddr,
}
impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            bind: default_control_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ForwardCfg {
    pub url: String,
    pub source: String,
    pub timeout_ms: u64,
}
impl Default for ForwardCfg {
    fn default() -> Self {
        Self {
            url: DEFAULT_FORWARD_URL.into(),
            source: "chiptime-localhost".into(),
            timeout_ms: 2000,
        }
    }
}
impl ForwardCfg {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct LogsCfg {
    pub dir: PathBuf,
    pub tail_lines: usize,
    pub level: String,
}
impl Default for LogsCfg {
    fn default() -> Self {
        Self {
            dir: "logs".into(),
            tail_lines: 100,
            level: "info".into(),
        }
    }
}

/// How the supervisor launches the ingestion service. When `program` is
/// unset the relay binary re-executes itself with `receive`.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SupervisorCfg {
    pub pid_file: PathBuf,
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
}
impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            pid_file: "receiver.pid".into(),
            program: None,
            args: Vec::new(),
        }
    }
}

fn default_receiver_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8081)
}

fn default_control_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

impl RelayCfg {
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.forward.url.is_empty(), "forward.url cannot be empty");
        anyhow::ensure!(
            !self.forward.source.is_empty(),
            "forward.source cannot be empty"
        );
        anyhow::ensure!(self.forward.timeout_ms > 0, "forward.timeout_ms must be > 0");
        anyhow::ensure!(self.logs.tail_lines > 0, "logs.tail_lines must be > 0");
        Ok(())
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(path: Option<&str>) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder().add_source(File::with_name("relay").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(path));
    }
    builder = builder.add_source(
        Environment::with_prefix("RELAY")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("supervisor.args")
            .try_parsing(true),
    );
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};
    use tempfile::tempdir;

    #[test]
    fn defaults_match_appliance_setup() {
        let cfg = RelayCfg::default();
        assert_eq!(cfg.receiver.bind.port(), 8081);
        assert_eq!(cfg.control.bind.port(), 8080);
        assert_eq!(cfg.forward.timeout(), Duration::from_secs(2));
        assert_eq!(cfg.supervisor.pid_file, PathBuf::from("receiver.pid"));
        cfg.validate().expect("defaults should validate");
    }

    #[test]
    fn loads_explicit_config_file() {
        let dir = tempdir().expect("failed to create temp dir for test");
        let path = dir.path().join("custom.toml");
        let toml = r#"
            [receiver]
            bind = "127.0.0.1:9999"

            [forward]
            url = "http://127.0.0.1:1/collect"
            timeout_ms = 500

            [supervisor]
            program = "/bin/sleep"
            args = ["30"]
        "#;
        fs::write(&path, toml).unwrap();

        let cfg = RelayCfg::load(path.to_str()).expect("config file should load");

        assert_eq!(
            cfg.receiver.bind,
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cfg.forward.url, "http://127.0.0.1:1/collect");
        assert_eq!(cfg.forward.source, "chiptime-localhost");
        assert_eq!(cfg.forward.timeout(), Duration::from_millis(500));
        assert_eq!(cfg.supervisor.program, Some(PathBuf::from("/bin/sleep")));
        assert_eq!(cfg.supervisor.args, vec!["30".to_string()]);
    }

    #[test]
    fn loads_from_config_file_in_cwd() {
        let dir = tempdir().expect("failed to create temp dir for test");
        let toml = r#"
            [control]
            bind = "127.0.0.1:9998"
        "#;
        fs::write(dir.path().join("relay.toml"), toml).unwrap();

        let old_cwd = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();

        let cfg = RelayCfg::load(None);

        env::set_current_dir(old_cwd).unwrap();

        let cfg = cfg.expect("config file should load");
        assert_eq!(
            cfg.control.bind,
            "127.0.0.1:9998".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = RelayCfg::default();
        cfg.forward.timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
