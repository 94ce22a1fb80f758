//! Kernel connection files.
//!
//! The kernel reads ports and the signing key from a JSON file passed via
//! `-f`; we allocate the ports and write the file before launch.

use std::io::Write;
use std::net::{Ipv4Addr, TcpListener};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Result;

/// Signature scheme advertised to the kernel.
pub const SIGNATURE_SCHEME: &str = "hmac-sha256";

/// Contents of a kernel connection file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub transport: String,
    pub ip: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub key: String,
    pub signature_scheme: String,
    pub kernel_name: String,
}

impl ConnectionInfo {
    /// Allocate five free loopback ports and a fresh signing key.
    pub fn allocate(kernel_name: &str) -> Result<Self> {
        let [shell_port, iopub_port, stdin_port, control_port, hb_port] = reserve_ports()?;

        Ok(Self {
            transport: "tcp".to_string(),
            ip: Ipv4Addr::LOCALHOST.to_string(),
            shell_port,
            iopub_port,
            stdin_port,
            control_port,
            hb_port,
            key: uuid::Uuid::new_v4().to_string(),
            signature_scheme: SIGNATURE_SCHEME.to_string(),
            kernel_name: kernel_name.to_string(),
        })
    }

    /// ZeroMQ endpoint for a port, e.g. `tcp://127.0.0.1:50123`.
    pub fn endpoint(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }

    /// Write to a temporary file that is removed when the handle drops.
    pub fn write_temp(&self) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("nbdigest-kernel-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.flush()?;
        Ok(file)
    }
}

/// Bind all listeners before releasing any so the ports are distinct.
fn reserve_ports() -> Result<[u16; 5]> {
    let listeners = (0..5)
        .map(|_| TcpListener::bind((Ipv4Addr::LOCALHOST, 0)))
        .collect::<std::io::Result<Vec<_>>>()?;

    let mut ports = [0u16; 5];
    for (slot, listener) in ports.iter_mut().zip(&listeners) {
        *slot = listener.local_addr()?.port();
    }
    Ok(ports)
}
