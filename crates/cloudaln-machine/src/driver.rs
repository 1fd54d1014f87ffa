//! Driver selection and sizing for new nodes.

/// Default zone for cloud nodes.
pub const DEFAULT_CLOUD_ZONE: &str = "us-central1-b";

/// Default machine type for cloud nodes.
pub const DEFAULT_CLOUD_MACHINE_TYPE: &str = "n1-highcpu-32";

/// Default boot disk size for cloud nodes, in GB.
pub const DEFAULT_CLOUD_DISK_SIZE_GB: u32 = 40;

/// Core hint for cloud nodes.
pub const DEFAULT_CLOUD_PARALLELISM: u32 = 16;

/// Core hint for local virtual machines.
pub const DEFAULT_LOCAL_PARALLELISM: u32 = 2;

/// Cloud driver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudDriver {
    /// Cloud project the nodes are billed to.
    pub project: String,

    pub zone: String,

    pub machine_type: String,

    pub disk_size_gb: u32,

    /// Request preemptible (spot) instances.
    pub preemptible: bool,

    /// Core hint handed to the workload.
    pub parallelism: u32,
}

impl CloudDriver {
    /// Create cloud settings for `project` with default sizing.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: DEFAULT_CLOUD_ZONE.to_string(),
            machine_type: DEFAULT_CLOUD_MACHINE_TYPE.to_string(),
            disk_size_gb: DEFAULT_CLOUD_DISK_SIZE_GB,
            preemptible: true,
            parallelism: DEFAULT_CLOUD_PARALLELISM,
        }
    }
}

/// Which fleet tool driver creates nodes, and how big they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverConfig {
    /// Local virtualization driver.
    Local { parallelism: u32 },
    /// Cloud driver.
    Cloud(CloudDriver),
}

impl DriverConfig {
    /// Local driver with the default core hint.
    pub fn local() -> Self {
        Self::Local {
            parallelism: DEFAULT_LOCAL_PARALLELISM,
        }
    }

    /// Cloud driver for `project` with default sizing.
    pub fn cloud(project: impl Into<String>) -> Self {
        Self::Cloud(CloudDriver::new(project))
    }

    /// Override the core hint.
    pub fn with_parallelism(mut self, cores: u32) -> Self {
        match &mut self {
            Self::Local { parallelism } => *parallelism = cores,
            Self::Cloud(cloud) => cloud.parallelism = cores,
        }
        self
    }

    /// Driver name as the fleet tool knows it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "virtualbox",
            Self::Cloud(_) => "google",
        }
    }

    /// Core hint for nodes created with this driver.
    pub fn parallelism(&self) -> u32 {
        match self {
            Self::Local { parallelism } => *parallelism,
            Self::Cloud(cloud) => cloud.parallelism,
        }
    }

    /// Driver arguments for `create`, excluding the subcommand and node name.
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec!["--driver".to_string(), self.name().to_string()];

        if let Self::Cloud(cloud) = self {
            args.extend([
                "--google-project".to_string(),
                cloud.project.clone(),
                "--google-zone".to_string(),
                cloud.zone.clone(),
                "--google-machine-type".to_string(),
                cloud.machine_type.clone(),
                "--google-disk-size".to_string(),
                cloud.disk_size_gb.to_string(),
            ]);
            if cloud.preemptible {
                args.push("--google-preemptible".to_string());
            }
        }

        args
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::local()
    }
}
