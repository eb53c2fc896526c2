// # nmap Network Prober
//
// [`NetworkProber`] implementation that shells out to the `nmap` binary.
//
// Two probe shapes:
//
// - `scan`: ping sweep (`nmap -sn`) over a CIDR target, yielding live hosts
//   with their reverse-resolved names and, when nmap runs with enough
//   privilege to see ARP replies, MAC address and vendor
// - `scan_services`: version probe (`nmap -sV`) of one host over a fixed
//   set of common service ports
//
// The sweep parses nmap's normal output because grepable output omits the
// MAC line. The service scan uses grepable output (`-oG -`), which packs
// every port into one line. Parsing is pure and unit-tested; process
// execution is a thin wrapper around `tokio::process`.

use async_trait::async_trait;
use chrono::Utc;
use labsync_core::error::{Error, Result};
use labsync_core::traits::{NetworkProber, ObservedHost, ObservedService, Transport};
use std::net::IpAddr;
use tokio::process::Command;
use tracing::{debug, info};

/// Ports probed during a deep service scan
const SERVICE_PORTS: &str = "22,53,80,443,445,3000,5380,8000,8080,8443,9090,9100";

/// Prober shelling out to nmap
#[derive(Debug, Clone)]
pub struct NmapProber {
    binary: String,
}

impl NmapProber {
    pub fn new() -> Self {
        Self {
            binary: "nmap".to_string(),
        }
    }

    /// Use a specific nmap binary instead of whatever is on PATH
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run_nmap(&self, args: &[&str]) -> Result<String> {
        debug!(binary = %self.binary, ?args, "running nmap");

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::prober(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::prober(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NmapProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProber for NmapProber {
    async fn scan(&self, target: &str) -> Result<Vec<ObservedHost>> {
        let stdout = self.run_nmap(&["-sn", target]).await?;
        let hosts = parse_ping_sweep(&stdout);
        info!(target, hosts = hosts.len(), "ping sweep complete");
        Ok(hosts)
    }

    async fn scan_services(&self, address: IpAddr) -> Result<Vec<ObservedService>> {
        let target = address.to_string();
        let stdout = self
            .run_nmap(&["-sV", "-p", SERVICE_PORTS, "-oG", "-", &target])
            .await?;
        let services = parse_service_scan(&stdout);
        info!(%address, services = services.len(), "service scan complete");
        Ok(services)
    }

    fn prober_name(&self) -> &'static str {
        "nmap"
    }
}

/// Parse normal ping-sweep output into live hosts
///
/// Each live host opens with a report line, optionally followed by a MAC
/// line when the scan ran with raw-socket privilege:
///
/// ```text
/// Nmap scan report for nas.lan (192.168.1.10)
/// Host is up (0.0021s latency).
/// MAC Address: AA:BB:CC:DD:EE:FF (Synology Incorporated)
/// ```
///
/// Unresolved hosts report as `Nmap scan report for 192.168.1.77`.
fn parse_ping_sweep(output: &str) -> Vec<ObservedHost> {
    let mut hosts: Vec<ObservedHost> = Vec::new();

    for line in output.lines() {
        if let Some(target) = line.strip_prefix("Nmap scan report for ") {
            let Some((address, hostname)) = parse_report_target(target.trim()) else {
                continue;
            };
            let mut host = ObservedHost::new(address);
            host.hostname = hostname;
            host.last_seen = Utc::now();
            hosts.push(host);
        } else if let Some(mac_field) = line.strip_prefix("MAC Address: ") {
            // The MAC line belongs to the report block above it
            if let (Some(host), Some((mac, vendor))) =
                (hosts.last_mut(), parse_mac_field(mac_field.trim()))
            {
                host.mac_address = Some(mac);
                host.vendor = vendor;
            }
        }
    }

    hosts
}

/// Parse grepable service-scan output into observed services
///
/// The ports field is a comma-separated list of
/// `port/state/proto/owner/service/rpcinfo/version/` entries; only open
/// ports are kept.
fn parse_service_scan(output: &str) -> Vec<ObservedService> {
    let mut services = Vec::new();

    for line in output.lines() {
        if !line.starts_with("Host:") {
            continue;
        }
        let Some(ports_field) = line.split("Ports:").nth(1) else {
            continue;
        };
        let ports_field = ports_field.split("\tIgnored").next().unwrap_or(ports_field);

        for entry in ports_field.split(',') {
            if let Some(service) = parse_port_entry(entry.trim()) {
                services.push(service);
            }
        }
    }

    services
}

/// Report targets come as `name (address)` or a bare `address`
fn parse_report_target(target: &str) -> Option<(IpAddr, Option<String>)> {
    if let Some((name, rest)) = target.split_once(" (") {
        let address: IpAddr = rest.strip_suffix(')')?.parse().ok()?;
        let hostname = (!name.is_empty()).then(|| name.to_string());
        return Some((address, hostname));
    }
    let address: IpAddr = target.parse().ok()?;
    Some((address, None))
}

/// MAC fields come as `AA:BB:CC:DD:EE:FF (Vendor Name)`; nmap reports an
/// unresolvable vendor as `(Unknown)`.
fn parse_mac_field(field: &str) -> Option<(String, Option<String>)> {
    let mut parts = field.splitn(2, ' ');
    let mac = parts.next()?;
    if mac.len() != 17 || !mac.bytes().all(|b| b.is_ascii_hexdigit() || b == b':') {
        return None;
    }

    let vendor = parts
        .next()
        .and_then(|token| token.strip_prefix('('))
        .and_then(|token| token.strip_suffix(')'))
        .filter(|name| !name.is_empty() && *name != "Unknown")
        .map(str::to_string);

    Some((mac.to_string(), vendor))
}

fn parse_port_entry(entry: &str) -> Option<ObservedService> {
    let fields: Vec<&str> = entry.split('/').collect();
    if fields.len() < 5 || fields[1] != "open" {
        return None;
    }

    let port: u16 = fields[0].parse().ok()?;
    let transport = match fields[2] {
        "tcp" => Transport::Tcp,
        "udp" => Transport::Udp,
        _ => return None,
    };
    let name = match fields[4] {
        "" => None,
        service => Some(service.to_string()),
    };

    let (product, version) = fields
        .get(6)
        .map(|info| parse_version_info(info))
        .unwrap_or((None, None));

    Some(ObservedService {
        port,
        transport,
        name,
        product,
        version,
    })
}

/// Split nmap's version field (`OpenSSH 8.9p1 Ubuntu`) into product and
/// version at the first numeric token.
fn parse_version_info(info: &str) -> (Option<String>, Option<String>) {
    let info = info.trim();
    if info.is_empty() {
        return (None, None);
    }

    let mut product_words = Vec::new();
    let mut version = None;
    for word in info.split_whitespace() {
        if version.is_none() && word.starts_with(|c: char| c.is_ascii_digit()) {
            version = Some(word.to_string());
        } else if version.is_none() {
            product_words.push(word);
        }
    }

    let product = if product_words.is_empty() {
        None
    } else {
        Some(product_words.join(" "))
    };
    (product, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING_SWEEP: &str = "\
Starting Nmap 7.94 ( https://nmap.org )
Nmap scan report for gateway.lan (192.168.1.1)
Host is up (0.0011s latency).
MAC Address: AA:BB:CC:11:22:33 (Ubiquiti Networks)
Nmap scan report for nas.lan (192.168.1.10)
Host is up (0.0024s latency).
MAC Address: AA:BB:CC:44:55:66 (Unknown)
Nmap scan report for 192.168.1.77
Host is up (0.0030s latency).
Nmap done: 256 IP addresses (3 hosts up) scanned in 2.51 seconds
";

    const SERVICE_SCAN: &str = "\
# Nmap 7.94 scan initiated
Host: 192.168.1.10 (nas.lan)\tPorts: 22/open/tcp//ssh//OpenSSH 8.9p1 Ubuntu/, 445/open/tcp//microsoft-ds//Samba smbd 4.6.2/, 80/closed/tcp//http///\tIgnored State: filtered (9)
# Nmap done
";

    #[test]
    fn ping_sweep_yields_named_and_unnamed_hosts() {
        let hosts = parse_ping_sweep(PING_SWEEP);
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0].address, "192.168.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(hosts[0].hostname.as_deref(), Some("gateway.lan"));
        assert_eq!(hosts[1].hostname.as_deref(), Some("nas.lan"));
        // Hosts without reverse DNS still count, just unnamed
        assert_eq!(hosts[2].address, "192.168.1.77".parse::<IpAddr>().unwrap());
        assert!(hosts[2].hostname.is_none());
    }

    #[test]
    fn ping_sweep_attaches_mac_and_vendor_to_the_right_host() {
        let hosts = parse_ping_sweep(PING_SWEEP);
        assert_eq!(hosts[0].mac_address.as_deref(), Some("AA:BB:CC:11:22:33"));
        assert_eq!(hosts[0].vendor.as_deref(), Some("Ubiquiti Networks"));

        // "(Unknown)" keeps the MAC but drops the vendor
        assert_eq!(hosts[1].mac_address.as_deref(), Some("AA:BB:CC:44:55:66"));
        assert!(hosts[1].vendor.is_none());

        // Unprivileged scans print no MAC line at all
        assert!(hosts[2].mac_address.is_none());
        assert!(hosts[2].vendor.is_none());
    }

    #[test]
    fn malformed_mac_fields_are_skipped() {
        assert!(parse_mac_field("not-a-mac (Vendor)").is_none());
        assert!(parse_mac_field("AA:BB:CC:11:22:3G (Vendor)").is_none());
        assert_eq!(
            parse_mac_field("AA:BB:CC:11:22:33"),
            Some(("AA:BB:CC:11:22:33".to_string(), None))
        );
    }

    #[test]
    fn service_scan_keeps_only_open_ports() {
        let services = parse_service_scan(SERVICE_SCAN);
        assert_eq!(services.len(), 2);

        assert_eq!(services[0].port, 22);
        assert_eq!(services[0].transport, Transport::Tcp);
        assert_eq!(services[0].name.as_deref(), Some("ssh"));
        assert_eq!(services[0].product.as_deref(), Some("OpenSSH"));
        assert_eq!(services[0].version.as_deref(), Some("8.9p1"));

        assert_eq!(services[1].port, 445);
        assert_eq!(services[1].product.as_deref(), Some("Samba smbd"));
        assert_eq!(services[1].version.as_deref(), Some("4.6.2"));
    }

    #[test]
    fn version_info_without_digits_is_product_only() {
        let (product, version) = parse_version_info("Apache httpd");
        assert_eq!(product.as_deref(), Some("Apache httpd"));
        assert!(version.is_none());
    }

    #[test]
    fn empty_version_info_is_none() {
        assert_eq!(parse_version_info(""), (None, None));
    }

    #[test]
    fn malformed_port_entries_are_skipped() {
        assert!(parse_port_entry("garbage").is_none());
        assert!(parse_port_entry("99999/open/tcp//http///").is_none());
        assert!(parse_port_entry("80/filtered/tcp//http///").is_none());
    }

    #[tokio::test]
    async fn missing_binary_surfaces_a_prober_error() {
        let prober = NmapProber::with_binary("definitely-not-nmap-bin");
        let err = prober.scan("192.168.1.0/24").await.unwrap_err();
        assert!(matches!(err, Error::Prober(_)));
    }
}
