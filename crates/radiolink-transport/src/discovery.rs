//! Serial port discovery.
//!
//! Enumerates the serial ports on the host and narrows them down to the
//! ones that look like a modem adapter, matched by a case-sensitive
//! substring on the port description or name. Selection is automatic when
//! exactly one candidate remains; otherwise the caller supplies a chooser
//! (typically an operator prompt).

use std::fmt;

use radiolink_core::error::{Error, Result};
use tokio_serial::{SerialPortInfo, SerialPortType};

/// Description substrings that identify a modem adapter by default.
pub const DEFAULT_PORT_FILTERS: &[&str] = &["USB", "XBee", "CP210"];

/// A serial port that passed the description filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// Device identifier to open (e.g. `/dev/ttyUSB0`, `COM7`).
    pub name: String,
    /// Human-readable description (USB product and manufacturer).
    pub description: String,
}

impl fmt::Display for PortCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} ({})", self.name, self.description)
        }
    }
}

fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.product.as_deref(), usb.manufacturer.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                format!("USB device {:04x}:{:04x}", usb.vid, usb.pid)
            } else {
                parts.join(" - ")
            }
        }
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::Unknown => String::new(),
    }
}

/// Keep the candidates whose description or name contains one of `filters`.
pub fn filter_candidates(candidates: Vec<PortCandidate>, filters: &[&str]) -> Vec<PortCandidate> {
    candidates
        .into_iter()
        .filter(|c| {
            filters
                .iter()
                .any(|f| c.description.contains(f) || c.name.contains(f))
        })
        .collect()
}

/// List the serial ports that look like modem adapters.
pub fn list_candidate_ports(filters: &[&str]) -> Result<Vec<PortCandidate>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Transport(format!("failed to enumerate serial ports: {e}")))?;

    let all: Vec<PortCandidate> = ports
        .iter()
        .map(|info| PortCandidate {
            name: info.port_name.clone(),
            description: describe(info),
        })
        .collect();
    tracing::debug!(ports = all.len(), "enumerated serial ports");

    let candidates = filter_candidates(all, filters);
    for c in &candidates {
        tracing::debug!(port = %c.name, description = %c.description, "candidate port");
    }
    Ok(candidates)
}

/// Pick one port out of `candidates`.
///
/// A single candidate is selected automatically. With several, `choose` is
/// called with the full list and returns the index the operator picked, or
/// `None` to abort.
pub fn select_port<F>(mut candidates: Vec<PortCandidate>, choose: F) -> Result<PortCandidate>
where
    F: FnOnce(&[PortCandidate]) -> Option<usize>,
{
    match candidates.len() {
        0 => Err(Error::Transport(
            "no suitable serial port found; connect the modem adapter".into(),
        )),
        1 => {
            let port = candidates.remove(0);
            tracing::info!(port = %port.name, "auto-selected serial port");
            Ok(port)
        }
        n => match choose(&candidates) {
            Some(idx) if idx < n => Ok(candidates.swap_remove(idx)),
            Some(idx) => Err(Error::InvalidParameter(format!(
                "port selection {idx} out of range (0..{n})"
            ))),
            None => Err(Error::InvalidParameter("no serial port selected".into())),
        },
    }
}
