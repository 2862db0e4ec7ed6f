//! Human-readable and JSON rendering of reports

use anyhow::Result;
use netst_core::{ConnectivityReport, DiscoveryReport, RunStatus, ScanReport};
use serde::Serialize;

pub fn to_json<T: Serialize>(report: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn status_line(out: &mut String, status: &RunStatus) {
    if !status.is_completed() {
        out.push_str(&format!("Run {}\n", status));
    }
}

pub fn render_connectivity(report: &ConnectivityReport) -> String {
    let mut out = format!(
        "{} of {} targets reachable:\n",
        report.reachable(),
        report.results.len()
    );
    for (target, result) in &report.results {
        out.push_str(&format!("  - {}: {}\n", target, result));
    }
    status_line(&mut out, &report.status);
    out
}

pub fn render_scan(report: &ScanReport) -> String {
    let mut out = format!(
        "Scanned {} ports on {} ({} open):\n",
        report.ports.len(),
        report.target,
        report.open_ports().count()
    );
    for (port, state) in &report.ports {
        out.push_str(&format!("  {:>5}/tcp  {}\n", port, state));
    }
    status_line(&mut out, &report.status);
    out
}

pub fn render_discovery(report: &DiscoveryReport) -> String {
    let mut out = format!("Discovered {} neighbours:\n", report.neighbors.len());
    for neighbor in &report.neighbors {
        let frame = &neighbor.frame;
        out.push_str(&format!(
            "  - {} via {} ({}) port {}\n",
            frame.hostname(),
            neighbor.local_interface,
            frame.protocol,
            frame.port_id
        ));
        out.push_str(&format!("    Chassis: {}\n", frame.chassis_id));
        if let Some(addr) = frame.management_address {
            out.push_str(&format!("    Management: {}\n", addr));
        }
        if let Some(platform) = &frame.platform {
            out.push_str(&format!("    Platform: {}\n", platform));
        }
        if !frame.capabilities.is_empty() {
            out.push_str(&format!("    Capabilities: {}\n", frame.capabilities));
        }
    }

    if !report.sources.is_empty() {
        out.push_str("Devices queried:\n");
        for (target, result) in &report.sources {
            out.push_str(&format!("  - {}: {}\n", target, result));
        }
    }
    status_line(&mut out, &report.status);
    out
}
