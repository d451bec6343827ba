//! TCP port reachability

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::checks::{CheckConfig, CheckResult, ConfigError, Probe, Telemetry};

/// Expected state of every probed port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortExpectation {
    Open,
    Closed,
}

/// Connects to every server/port pair and compares against the expectation
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    servers: Vec<IpAddr>,
    ports: Vec<u16>,
    expect: PortExpectation,
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(servers: Vec<IpAddr>, ports: Vec<u16>, expect: PortExpectation) -> Self {
        Self {
            servers,
            ports,
            expect,
            timeout: crate::checks::DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn is_open(&self, addr: SocketAddr) -> Result<bool, String> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => Ok(false),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("timeout".to_string()),
        }
    }
}

fn from_config(
    config: &mut CheckConfig,
    expect: PortExpectation,
) -> Result<Box<dyn Probe>, ConfigError> {
    let servers = config.require_ip_list("servers")?;
    let ports = config.require_port_list("ports")?;
    let timeout = config.take_timeout()?;
    Ok(Box::new(
        TcpPortProbe::new(servers, ports, expect).with_timeout(timeout),
    ))
}

pub fn closed_from_config(config: &mut CheckConfig) -> Result<Box<dyn Probe>, ConfigError> {
    from_config(config, PortExpectation::Closed)
}

pub fn open_from_config(config: &mut CheckConfig) -> Result<Box<dyn Probe>, ConfigError> {
    from_config(config, PortExpectation::Open)
}

#[async_trait]
impl Probe for TcpPortProbe {
    async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult {
        for server in &self.servers {
            for port in &self.ports {
                let addr = SocketAddr::new(*server, *port);
                let state = self.is_open(addr).await;
                telemetry.set_named(addr.to_string(), "open", state.as_ref().ok().copied());

                // Unreachable hosts count as closed; only an accepted connection is "open".
                match (self.expect, state) {
                    (PortExpectation::Closed, Ok(true)) => {
                        return CheckResult::failed(format!("port {} open on {}", port, server));
                    }
                    (PortExpectation::Closed, _) => {}
                    (PortExpectation::Open, Ok(true)) => {}
                    (PortExpectation::Open, Ok(false)) => {
                        return CheckResult::failed(format!("port {} closed on {}", port, server));
                    }
                    (PortExpectation::Open, Err(e)) => {
                        telemetry.set_named(addr.to_string(), "error", e);
                        return CheckResult::failed(format!(
                            "port {} unreachable on {}",
                            port, server
                        ));
                    }
                }
            }
        }
        CheckResult::ok()
    }

    fn description(&self) -> String {
        let servers: Vec<String> = self.servers.iter().map(|s| s.to_string()).collect();
        let ports: Vec<String> = self.ports.iter().map(|p| p.to_string()).collect();
        let state = match self.expect {
            PortExpectation::Open => "open",
            PortExpectation::Closed => "closed",
        };
        format!(
            "TCP {} check, servers [{}], ports [{}]",
            state,
            servers.join(", "),
            ports.join(", ")
        )
    }

    fn kind(&self) -> &'static str {
        match self.expect {
            PortExpectation::Open => "tcpportopen",
            PortExpectation::Closed => "tcpportclosed",
        }
    }
}
