//! Command line surface and run configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use cloudaln_machine::{CloudDriver, DriverConfig};

use crate::error::ServerError;
use crate::http::BasicCredentials;

/// Align sharded reads on a throwaway fleet of container hosts.
#[derive(Parser, Debug, Clone)]
#[command(name = "cloud-aln", about = "Align sharded reads on a fleet of container hosts")]
pub struct Cli {
    /// Cloud project to provision nodes in. Uses local VMs when omitted.
    #[arg(long)]
    pub cloud_project: Option<String>,

    /// Address (host:port) nodes use to reach this machine's file server
    #[arg(long, default_value = "localhost:8080")]
    pub socket_address: String,

    /// Address the file server binds to. Defaults to 0.0.0.0 on the socket address port.
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Maximum number of nodes to provision
    #[arg(long, default_value = "1")]
    pub max_nodes: usize,

    /// Container image that runs the alignment
    #[arg(long, default_value = "statgen/alignment")]
    pub image: String,

    /// Fleet tool binary
    #[arg(long, default_value = "docker-machine")]
    pub fleet_tool: String,

    /// Cloud zone
    #[arg(long)]
    pub cloud_zone: Option<String>,

    /// Cloud machine type
    #[arg(long)]
    pub cloud_machine_type: Option<String>,

    /// Cloud boot disk size in GB
    #[arg(long)]
    pub cloud_disk_size: Option<u32>,

    /// Request regular instead of preemptible cloud instances
    #[arg(long)]
    pub no_preemptible: bool,

    /// Cores handed to the aligner on each node
    #[arg(long)]
    pub cores: Option<u32>,

    /// File server user name
    #[arg(long, default_value = "cloud-aln")]
    pub auth_user: String,

    /// File server password. Generated when omitted.
    #[arg(long, conflicts_with = "no_auth")]
    pub auth_password: Option<String>,

    /// Serve files without authentication
    #[arg(long)]
    pub no_auth: bool,

    /// Timeout for engine pull, create and start requests, in seconds
    #[arg(long, default_value = "1800")]
    pub request_timeout_secs: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Reference path prefix; index files are <reference>.{amb,ann,bwt,pac,sa}
    pub reference: PathBuf,

    /// Read shards, one per file
    #[arg(required = true)]
    pub reads: Vec<PathBuf>,
}

/// Run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Driver and node sizing.
    pub driver: DriverConfig,

    /// Upper bound on provisioned nodes.
    pub max_nodes: usize,

    pub image: String,

    /// Fleet tool binary.
    pub fleet_tool: String,

    /// Address nodes use to reach the file server.
    pub socket_address: String,

    /// Address the file server listens on.
    pub bind_address: String,

    /// Reference path prefix.
    pub reference: PathBuf,

    /// Read shards. Shard `i` is `reads[i]`.
    pub reads: Vec<PathBuf>,

    /// File server credentials, if the server is gated.
    pub credentials: Option<BasicCredentials>,

    /// Bound on engine requests other than wait.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: DriverConfig::local(),
            max_nodes: 1,
            image: "statgen/alignment".to_string(),
            fleet_tool: "docker-machine".to_string(),
            socket_address: "localhost:8080".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            reference: PathBuf::new(),
            reads: Vec::new(),
            credentials: None,
            request_timeout: Duration::from_secs(1800),
        }
    }
}

impl Config {
    /// Build the run configuration from parsed arguments.
    pub fn from_cli(cli: Cli) -> Result<Self, ServerError> {
        if cli.max_nodes == 0 {
            return Err(ServerError::Config("--max-nodes must be at least 1".into()));
        }
        if cli.cores == Some(0) {
            return Err(ServerError::Config("--cores must be at least 1".into()));
        }

        let port = socket_port(&cli.socket_address)?;
        let bind_address = cli
            .bind_address
            .unwrap_or_else(|| format!("0.0.0.0:{}", port));

        let mut driver = match cli.cloud_project {
            Some(project) => {
                let mut cloud = CloudDriver::new(project);
                if let Some(zone) = cli.cloud_zone {
                    cloud.zone = zone;
                }
                if let Some(machine_type) = cli.cloud_machine_type {
                    cloud.machine_type = machine_type;
                }
                if let Some(disk_size_gb) = cli.cloud_disk_size {
                    cloud.disk_size_gb = disk_size_gb;
                }
                cloud.preemptible = !cli.no_preemptible;
                DriverConfig::Cloud(cloud)
            }
            None => DriverConfig::local(),
        };
        if let Some(cores) = cli.cores {
            driver = driver.with_parallelism(cores);
        }

        let credentials = if cli.no_auth {
            None
        } else {
            Some(match cli.auth_password {
                Some(password) => BasicCredentials::new(cli.auth_user, password),
                None => BasicCredentials::generate(cli.auth_user),
            })
        };

        Ok(Self {
            driver,
            max_nodes: cli.max_nodes,
            image: cli.image,
            fleet_tool: cli.fleet_tool,
            socket_address: cli.socket_address,
            bind_address,
            reference: cli.reference,
            reads: cli.reads,
            credentials,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
        })
    }
}

fn socket_port(address: &str) -> Result<u16, ServerError> {
    address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .ok_or_else(|| {
            ServerError::Config(format!("socket address must be host:port, got '{}'", address))
        })
}
