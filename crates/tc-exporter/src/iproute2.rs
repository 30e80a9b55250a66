//! Traffic-control data source backed by the iproute2 `ip` and `tc` tools.
//!
//! Both tools are run in JSON mode (`-j`) and their output is parsed with
//! `serde_json`. Named namespaces are addressed with `-n <name>`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Map, Value};
use tc_metrics::{DEFAULT_NAMESPACE, Interface, Stats, Stats2, TcObject, TcSource, XStats};
use tracing::debug;

use crate::error::{ExporterError, ExporterResult};

/// Directory `ip netns` keeps its namespace handles in.
pub const NETNS_DIR: &str = "/var/run/netns";

/// Reads traffic-control state by shelling out to `ip` and `tc`.
#[derive(Debug, Clone)]
pub struct Iproute2Source {
    netns_dir: PathBuf,
    ip: PathBuf,
    tc: PathBuf,
}

impl Default for Iproute2Source {
    fn default() -> Self {
        Self {
            netns_dir: PathBuf::from(NETNS_DIR),
            ip: PathBuf::from("ip"),
            tc: PathBuf::from("tc"),
        }
    }
}

impl Iproute2Source {
    /// Creates a source using `ip` and `tc` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads namespace names from `dir` instead of [`NETNS_DIR`].
    #[must_use]
    pub fn with_netns_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.netns_dir = dir.into();
        self
    }

    /// Uses explicit paths for the `ip` and `tc` binaries.
    #[must_use]
    pub fn with_binaries(mut self, ip: impl Into<PathBuf>, tc: impl Into<PathBuf>) -> Self {
        self.ip = ip.into();
        self.tc = tc.into();
        self
    }

    fn run(program: &Path, namespace: &str, args: &[&str]) -> ExporterResult<String> {
        let mut command = Command::new(program);
        command.arg("-j");
        if namespace != DEFAULT_NAMESPACE {
            command.args(["-n", namespace]);
        }
        command.args(args);

        let line = format!("{command:?}");
        let output = command.output().map_err(|e| ExporterError::Command {
            command: line.clone(),
            reason: format!("failed to run {}: {e}", program.display()),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExporterError::Command {
                command: line,
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ExporterError::Parse {
            what: "command output",
            reason: e.to_string(),
        })
    }

    fn show(
        &self,
        namespace: &str,
        object: &str,
        interface: &Interface,
    ) -> ExporterResult<Vec<TcObject>> {
        let args = ["-s", object, "show", "dev", interface.name.as_str()];
        let output = Self::run(&self.tc, namespace, &args)?;
        parse_objects(&output)
    }
}

impl TcSource for Iproute2Source {
    fn list_namespaces(&self) -> tc_metrics::Result<Vec<String>> {
        list_netns(&self.netns_dir).map_err(|e| {
            tc_metrics::MetricsError::source_error(format!(
                "failed to read {}: {e}",
                self.netns_dir.display()
            ))
        })
    }

    fn list_interfaces(&self, namespace: &str) -> tc_metrics::Result<Vec<Interface>> {
        let output = Self::run(&self.ip, namespace, &["link", "show"])?;
        Ok(parse_links(&output)?)
    }

    fn list_qdiscs(
        &self,
        namespace: &str,
        interface: &Interface,
    ) -> tc_metrics::Result<Vec<TcObject>> {
        Ok(self.show(namespace, "qdisc", interface)?)
    }

    fn list_classes(
        &self,
        namespace: &str,
        interface: &Interface,
    ) -> tc_metrics::Result<Vec<TcObject>> {
        Ok(self.show(namespace, "class", interface)?)
    }
}

/// Lists the named namespaces under `dir`, followed by [`DEFAULT_NAMESPACE`].
///
/// A missing directory means no named namespaces exist. Subdirectories are
/// skipped.
pub fn list_netns(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(vec![DEFAULT_NAMESPACE.to_string()]);
        }
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names.push(DEFAULT_NAMESPACE.to_string());
    Ok(names)
}

fn parse_records(json: &str, what: &'static str) -> ExporterResult<Vec<Map<String, Value>>> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| ExporterError::Parse {
        what,
        reason: e.to_string(),
    })
}

/// Parses `ip -j link show` output, skipping loopback devices.
pub fn parse_links(json: &str) -> ExporterResult<Vec<Interface>> {
    let mut interfaces = Vec::new();
    for record in parse_records(json, "ip link output")? {
        let loopback = record.get("link_type").and_then(Value::as_str) == Some("loopback")
            || record
                .get("flags")
                .and_then(Value::as_array)
                .is_some_and(|flags| flags.iter().any(|f| f.as_str() == Some("LOOPBACK")));
        if loopback {
            continue;
        }

        let index = record
            .get("ifindex")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok());
        let name = record.get("ifname").and_then(Value::as_str);
        match (index, name) {
            (Some(index), Some(name)) => interfaces.push(Interface::new(index, name)),
            _ => {
                return Err(ExporterError::Parse {
                    what: "ip link output",
                    reason: "link without ifindex or ifname".to_string(),
                });
            }
        }
    }
    Ok(interfaces)
}

/// Parses `tc -s -j qdisc|class show` output.
pub fn parse_objects(json: &str) -> ExporterResult<Vec<TcObject>> {
    parse_records(json, "tc output")?
        .iter()
        .map(object_from_record)
        .collect()
}

fn counter(record: &Map<String, Value>, key: &str) -> u64 {
    record.get(key).and_then(Value::as_u64).unwrap_or_default()
}

fn object_from_record(record: &Map<String, Value>) -> ExporterResult<TcObject> {
    let kind = record
        .get("kind")
        .or_else(|| record.get("class"))
        .and_then(Value::as_str)
        .ok_or_else(|| ExporterError::Parse {
            what: "tc output",
            reason: "object without kind".to_string(),
        })?;

    let parent = if record.get("root").and_then(Value::as_bool) == Some(true) {
        "root"
    } else {
        record.get("parent").and_then(Value::as_str).unwrap_or_default()
    };

    let mut object = TcObject::new(kind)
        .with_handle(record.get("handle").and_then(Value::as_str).unwrap_or_default())
        .with_parent(parent);

    if record.contains_key("bytes") {
        object = object.with_stats2(Stats2 {
            bytes: counter(record, "bytes"),
            packets: counter(record, "packets"),
            drops: counter(record, "drops"),
            overlimits: counter(record, "overlimits"),
            qlen: counter(record, "qlen"),
            backlog: counter(record, "backlog"),
            requeues: counter(record, "requeues"),
        });
    }

    // Rate estimates only exist in the legacy block.
    if let Some(rate) = record.get("rate_est").and_then(Value::as_object) {
        object = object.with_stats(Stats {
            bytes: counter(record, "bytes"),
            packets: counter(record, "packets"),
            drops: counter(record, "drops"),
            overlimits: counter(record, "overlimits"),
            bps: counter(rate, "bps"),
            pps: counter(rate, "pps"),
            qlen: counter(record, "qlen"),
            backlog: counter(record, "backlog"),
        });
    }

    object.xstats = extended_stats(kind, record);
    Ok(object)
}

/// Extended statistics are either nested under `xstats` or printed flat
/// into the object record, depending on the iproute2 version.
fn extended_stats(kind: &str, record: &Map<String, Value>) -> Option<XStats> {
    let keys = XStats::keys_for(kind)?;
    let source = match record.get("xstats").and_then(Value::as_object) {
        Some(nested) => nested,
        None if keys.iter().any(|k| record.contains_key(*k)) => record,
        None => return None,
    };

    match XStats::deserialize_for_kind(kind, Value::Object(source.clone())) {
        Ok(xstats) => xstats,
        Err(e) => {
            debug!(kind, error = %e, "Ignoring malformed extended statistics");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_metrics::tc::{ExtendedStats, FqCodelXStats, HtbXStats, PieXStats};

    const LINKS: &str = include_str!("../tests/fixtures/link_show.json");
    const QDISCS: &str = include_str!("../tests/fixtures/qdisc_show.json");
    const CLASSES: &str = include_str!("../tests/fixtures/class_show.json");

    #[test]
    fn test_parse_links_skips_loopback() {
        let interfaces = parse_links(LINKS).unwrap();
        assert_eq!(
            interfaces,
            vec![Interface::new(2, "eth0"), Interface::new(7, "veth0")]
        );
    }

    #[test]
    fn test_parse_links_rejects_garbage() {
        let err = parse_links("not json").unwrap_err();
        assert!(matches!(err, ExporterError::Parse { what: "ip link output", .. }));
    }

    #[test]
    fn test_empty_output_is_empty_list() {
        assert!(parse_objects("").unwrap().is_empty());
        assert!(parse_links("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_root_qdisc() {
        let objects = parse_objects(QDISCS).unwrap();
        assert_eq!(objects.len(), 3);

        let htb = &objects[0];
        assert_eq!(htb.kind, "htb");
        assert_eq!(htb.handle, "1:");
        assert_eq!(htb.parent, "root");
        assert!(htb.stats.is_none());
        // A root htb qdisc carries no htb extended statistics.
        assert!(htb.xstats.is_none());

        let stats2 = htb.stats2.unwrap();
        assert_eq!(stats2.bytes, 1500);
        assert_eq!(stats2.packets, 12);
        assert_eq!(stats2.drops, 1);
        assert_eq!(stats2.overlimits, 4);
        assert_eq!(stats2.requeues, 2);
    }

    #[test]
    fn test_parse_flat_xstats() {
        let objects = parse_objects(QDISCS).unwrap();
        let fq_codel = &objects[1];
        assert_eq!(fq_codel.parent, "1:10");

        let xstats = fq_codel.xstats.as_ref().unwrap();
        let stats = FqCodelXStats::from_xstats(xstats).unwrap();
        assert_eq!(stats.maxpacket, 1514);
        assert_eq!(stats.new_flow_count, 5);
        assert_eq!(stats.ecn_mark, 1);
    }

    #[test]
    fn test_parse_rate_estimate() {
        let objects = parse_objects(QDISCS).unwrap();
        let pie = &objects[2];

        let stats = pie.stats.unwrap();
        assert_eq!(stats.bps, 2400);
        assert_eq!(stats.pps, 3);
        assert_eq!(stats.bytes, 300);

        let xstats = PieXStats::from_xstats(pie.xstats.as_ref().unwrap()).unwrap();
        assert!((xstats.prob - 0.25).abs() < f64::EPSILON);
        assert_eq!(xstats.packets_in, 2);
        assert_eq!(xstats.maxq, 1);
    }

    #[test]
    fn test_parse_classes_flat_and_nested() {
        let objects = parse_objects(CLASSES).unwrap();
        assert_eq!(objects.len(), 2);

        let flat = HtbXStats::from_xstats(objects[0].xstats.as_ref().unwrap()).unwrap();
        assert_eq!(objects[0].kind, "htb");
        assert_eq!(objects[0].parent, "1:");
        assert_eq!(flat.lends, 6);
        assert_eq!(flat.tokens, -25);
        assert_eq!(flat.ctokens, 400);

        let nested = HtbXStats::from_xstats(objects[1].xstats.as_ref().unwrap()).unwrap();
        assert_eq!(nested.lends, 2);
        assert_eq!(nested.borrows, 1);
        assert_eq!(nested.tokens, 12000);
    }

    #[test]
    fn test_object_without_kind_is_an_error() {
        let err = parse_objects(r#"[{"handle":"1:"}]"#).unwrap_err();
        assert!(err.to_string().contains("object without kind"));
    }

    #[test]
    fn test_unknown_kind_has_no_xstats() {
        let objects =
            parse_objects(r#"[{"kind":"mq","handle":"0:","root":true,"bytes":10}]"#).unwrap();
        assert!(objects[0].xstats.is_none());
        assert_eq!(objects[0].stats2.unwrap().bytes, 10);
    }

    #[test]
    fn test_missing_netns_dir_yields_default_only() {
        let dir = tempfile::tempdir().unwrap();
        let names = list_netns(&dir.path().join("netns")).unwrap();
        assert_eq!(names, vec!["default".to_string()]);
    }

    #[test]
    fn test_netns_named_first_default_last() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("red"), b"").unwrap();
        std::fs::write(dir.path().join("blue"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names = list_netns(dir.path()).unwrap();
        assert_eq!(names, vec!["blue", "red", "default"]);
    }

    #[test]
    fn test_missing_binary_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = Iproute2Source::new()
            .with_netns_dir(dir.path())
            .with_binaries(dir.path().join("no-ip"), dir.path().join("no-tc"));

        let err = source.list_interfaces(DEFAULT_NAMESPACE).unwrap_err();
        assert!(matches!(err, tc_metrics::MetricsError::Source { .. }));
        assert!(err.to_string().contains("failed to run"));
    }
}
