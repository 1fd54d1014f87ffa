//! Scanner for the fleet tool's `env` output.
//!
//! The output is a shell script of variable exports, e.g.
//!
//! ```text
//! export DOCKER_TLS_VERIFY="1"
//! export DOCKER_HOST="tcp://192.168.99.100:2376"
//! export DOCKER_CERT_PATH="/home/user/.docker/machine/machines/cloud-aln-x"
//! # Run this command to configure your shell:
//! # eval $(docker-machine env cloud-aln-x)
//! ```

use std::collections::HashMap;

use cloudaln_core::{CredentialBundle, Endpoint};

/// Variable holding the engine endpoint.
pub const DOCKER_HOST: &str = "DOCKER_HOST";

/// Variable holding the credential bundle directory.
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";

/// Key/value pairs exported by `env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineEnv {
    vars: HashMap<String, String>,
}

impl MachineEnv {
    /// Scan `text` line by line. Later assignments to a key override
    /// earlier ones.
    pub fn parse(text: &str) -> Self {
        let vars = text.lines().filter_map(parse_line).collect();
        Self { vars }
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Engine endpoint from `DOCKER_HOST`. Only `tcp://host:port` is accepted.
    pub fn docker_host(&self) -> Option<Endpoint> {
        let value = self.get(DOCKER_HOST)?;
        let addr = value.strip_prefix("tcp://")?.trim_end_matches('/');
        addr.parse().ok()
    }

    /// Credential bundle from `DOCKER_CERT_PATH`.
    pub fn cert_path(&self) -> Option<CredentialBundle> {
        self.get(DOCKER_CERT_PATH)
            .filter(|path| !path.is_empty())
            .map(CredentialBundle::new)
    }

    /// Both connection settings, or `None` if either is missing.
    pub fn connection(&self) -> Option<(Endpoint, CredentialBundle)> {
        Some((self.docker_host()?, self.cert_path()?))
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let line = strip_keyword(line, "export")
        .or_else(|| strip_keyword(line, "SET"))
        .unwrap_or(line);

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    Some((key.to_string(), unquote(value.trim()).to_string()))
}

/// Strip a leading shell keyword followed by whitespace.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
