//! Printing ports and probe results

use anyhow::Result;
use serde::Serialize;
use sigprobe::{PortDescriptor, ProbeResult};

#[derive(Serialize)]
struct Found<'a> {
    prober: &'a str,
    #[serde(flatten)]
    port: &'a PortDescriptor,
}

pub fn print_ports(ports: &[PortDescriptor], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(ports)?);
        return Ok(());
    }

    for port in ports {
        println!("{}", port_row(port));
    }
    Ok(())
}

pub fn print_results<P>(results: &[ProbeResult<P>], json: bool) -> Result<()> {
    if json {
        let found: Vec<_> = results
            .iter()
            .map(|r| Found {
                prober: &r.prober,
                port: &r.port,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    for result in results {
        println!("{:<16} {}", result.prober, port_row(&result.port));
    }
    Ok(())
}

fn port_row(port: &PortDescriptor) -> String {
    let ids = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
        _ => "-".to_string(),
    };
    format!(
        "{:<28} {:<9} {:<9} {} {}",
        port.path,
        format!("{:?}", port.kind).to_lowercase(),
        ids,
        port.manufacturer.as_deref().unwrap_or("-"),
        port.product.as_deref().unwrap_or("-"),
    )
}
