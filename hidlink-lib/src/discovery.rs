use crate::transport::{PortDescriptor, PortProvider};
use tracing::{debug, info, warn};

/// Lists every serial endpoint the provider can see. Enumeration failures
/// are logged and reported as an empty list.
pub fn list_ports(provider: &dyn PortProvider) -> Vec<PortDescriptor> {
    match provider.available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

/// Returns the first port whose description is exactly `description`.
///
/// No partial matching and no VID/PID inspection: the bridge's adapter is
/// recognised by its product string only.
pub fn find_device_port(provider: &dyn PortProvider, description: &str) -> Option<String> {
    for port in list_ports(provider) {
        debug!(
            port = %port.name,
            description = port.description.as_deref().unwrap_or("<none>"),
            "Found serial port"
        );
        if port.description.as_deref() == Some(description) {
            info!("Found bridge port {}", port.name);
            return Some(port.name);
        }
    }
    None
}
