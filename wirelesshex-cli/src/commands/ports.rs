//! List-ports command: enumerate serial ports for the gateway.

use console::style;
use log::warn;
use serialport::SerialPortType;

/// List ports command implementation.
pub(crate) fn cmd_list_ports() {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("failed to enumerate serial ports: {e}");
            Vec::new()
        },
    };

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("none found").dim());
        return;
    }

    for port in &ports {
        match &port.port_type {
            SerialPortType::UsbPort(usb) => {
                let product = usb.product.as_deref().unwrap_or("");
                eprintln!(
                    "  {} {} ({:04X}:{:04X}){}",
                    style("•").green(),
                    style(&port.port_name).cyan(),
                    usb.vid,
                    usb.pid,
                    if product.is_empty() {
                        String::new()
                    } else {
                        format!(" - {}", style(product).dim())
                    }
                );
            },
            SerialPortType::BluetoothPort | SerialPortType::PciPort => {
                eprintln!(
                    "  {} {}",
                    style("•").green(),
                    style(&port.port_name).cyan()
                );
            },
            SerialPortType::Unknown => {
                eprintln!(
                    "  {} {} {}",
                    style("•").dim(),
                    style(&port.port_name).cyan(),
                    style("(unknown type)").dim()
                );
            },
        }
    }
}
