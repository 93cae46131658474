//! LAN discovery
//!
//! Finds transfer peers by reading the kernel ARP table and probing each
//! neighbor's NETTF port with a short connect timeout. No raw sockets, so
//! no privileges are needed; hosts the kernel has never talked to simply
//! don't appear.

use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Device {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub has_service: bool,
}

#[cfg(target_os = "linux")]
pub fn arp_neighbors() -> Result<Vec<(Ipv4Addr, String)>> {
    use anyhow::Context;
    let text = std::fs::read_to_string("/proc/net/arp").context("read /proc/net/arp")?;
    Ok(parse_arp_table(&text))
}

#[cfg(not(target_os = "linux"))]
pub fn arp_neighbors() -> Result<Vec<(Ipv4Addr, String)>> {
    Ok(Vec::new())
}

// /proc/net/arp format: IP | HW type | Flags | HW address | Mask | Device.
// Flags bit 0x2 is ATF_COM (completed entry).
fn parse_arp_table(text: &str) -> Vec<(Ipv4Addr, String)> {
    let mut neighbors = Vec::new();
    for line in text.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let Ok(ip) = fields[0].parse::<Ipv4Addr>() else {
            continue;
        };
        let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).unwrap_or(0);
        let mac = fields[3].to_string();
        if flags & 0x2 == 0 || mac == "00:00:00:00:00:00" {
            continue;
        }
        neighbors.push((ip, mac));
    }
    neighbors
}

/// True when something accepts TCP connections on `ip:port` within the
/// timeout.
pub fn probe_service(ip: Ipv4Addr, port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from(SocketAddrV4::new(ip, port));
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

/// Probe every ARP neighbor concurrently and report which ones run the
/// service.
pub fn discover(port: u16, timeout: Duration) -> Result<Vec<Device>> {
    let neighbors = arp_neighbors()?;

    let handles: Vec<_> = neighbors
        .into_iter()
        .map(|(ip, mac)| {
            thread::spawn(move || Device {
                ip,
                mac,
                has_service: probe_service(ip, port, timeout),
            })
        })
        .collect();

    let mut devices: Vec<Device> = handles
        .into_iter()
        .filter_map(|h| h.join().ok())
        .collect();
    devices.sort_by_key(|d| d.ip);
    Ok(devices)
}

/// Print the discovery result as a table plus a summary.
pub fn print_devices(devices: &[Device], port: u16) {
    println!("{:<16} {:<18} {}", "IP ADDRESS", "MAC ADDRESS", "SERVICE");
    println!("{}", "-".repeat(44));
    for d in devices {
        println!(
            "{:<16} {:<18} {}",
            d.ip,
            d.mac,
            if d.has_service { "yes" } else { "-" }
        );
    }

    let with_service = devices.iter().filter(|d| d.has_service).count();
    println!("\nDiscovery completed. Found {} device(s).", devices.len());
    println!(
        "{} device(s) have the NETTF service running on port {}.",
        with_service, port
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "IP address       HW type     Flags       HW address            Mask     Device\n\
192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0\n\
192.168.1.50     0x1         0x0         00:00:00:00:00:00     *        eth0\n\
192.168.1.77     0x1         0x2         11:22:33:44:55:66     *        wlan0\n";

    #[test]
    fn parses_completed_arp_entries_only() {
        let neighbors = parse_arp_table(SAMPLE);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].0, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(neighbors[0].1, "aa:bb:cc:dd:ee:ff");
        assert_eq!(neighbors[1].0, Ipv4Addr::new(192, 168, 1, 77));
    }

    #[test]
    fn probe_detects_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe_service(
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_millis(200)
        ));
    }

    #[test]
    fn probe_times_out_on_closed_port() {
        // Bind then drop to get a port that is almost certainly closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!probe_service(
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_millis(200)
        ));
    }
}
