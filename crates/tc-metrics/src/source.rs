//! Traffic-control data sources.
//!
//! Collectors never talk to the kernel directly; they enumerate namespaces,
//! interfaces and objects through a [`TcSource`].

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::error::{MetricsError, Result};
use crate::tc::{Interface, TcObject};

/// Name of the namespace the process itself runs in.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Enumerates traffic-control state across network namespaces.
pub trait TcSource: Send + Sync {
    /// Lists network namespace names, including [`DEFAULT_NAMESPACE`].
    fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Lists the interfaces of `namespace`.
    fn list_interfaces(&self, namespace: &str) -> Result<Vec<Interface>>;

    /// Lists the qdiscs attached to `interface`.
    fn list_qdiscs(&self, namespace: &str, interface: &Interface) -> Result<Vec<TcObject>>;

    /// Lists the classes attached to `interface`.
    fn list_classes(&self, namespace: &str, interface: &Interface) -> Result<Vec<TcObject>>;
}

#[derive(Debug, Default)]
struct FakeNamespace {
    interfaces: Vec<Interface>,
    qdiscs: BTreeMap<String, Vec<TcObject>>,
    classes: BTreeMap<String, Vec<TcObject>>,
}

#[derive(Debug, Default)]
struct FakeState {
    namespaces: BTreeMap<String, FakeNamespace>,
    fail_namespaces: bool,
    failing_interfaces: BTreeSet<String>,
}

/// An in-memory data source for testing.
#[derive(Debug, Default)]
pub struct FakeTcSource {
    state: RwLock<FakeState>,
}

impl FakeTcSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a namespace with the given interfaces.
    #[must_use]
    pub fn with_namespace(self, namespace: &str, interfaces: Vec<Interface>) -> Self {
        self.state
            .write()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .interfaces
            .extend(interfaces);
        self
    }

    /// Attaches a qdisc to `device` in `namespace`.
    #[must_use]
    pub fn with_qdisc(self, namespace: &str, device: &str, qdisc: TcObject) -> Self {
        self.add_qdisc(namespace, device, qdisc);
        self
    }

    /// Attaches a class to `device` in `namespace`.
    #[must_use]
    pub fn with_class(self, namespace: &str, device: &str, class: TcObject) -> Self {
        self.state
            .write()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .classes
            .entry(device.to_string())
            .or_default()
            .push(class);
        self
    }

    /// Attaches a qdisc after construction.
    pub fn add_qdisc(&self, namespace: &str, device: &str, qdisc: TcObject) {
        self.state
            .write()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .qdiscs
            .entry(device.to_string())
            .or_default()
            .push(qdisc);
    }

    /// Makes [`TcSource::list_namespaces`] fail.
    pub fn set_fail_namespaces(&self, fail: bool) {
        self.state.write().fail_namespaces = fail;
    }

    /// Makes [`TcSource::list_interfaces`] fail for `namespace`.
    pub fn fail_interfaces(&self, namespace: &str) {
        self.state
            .write()
            .failing_interfaces
            .insert(namespace.to_string());
    }
}

impl TcSource for FakeTcSource {
    fn list_namespaces(&self) -> Result<Vec<String>> {
        let state = self.state.read();
        if state.fail_namespaces {
            return Err(MetricsError::source_error("namespace listing failed"));
        }
        Ok(state.namespaces.keys().cloned().collect())
    }

    fn list_interfaces(&self, namespace: &str) -> Result<Vec<Interface>> {
        let state = self.state.read();
        if state.failing_interfaces.contains(namespace) {
            return Err(MetricsError::source_error(format!(
                "interface listing failed in {namespace}"
            )));
        }
        state
            .namespaces
            .get(namespace)
            .map(|ns| ns.interfaces.clone())
            .ok_or_else(|| MetricsError::source_error(format!("no such namespace: {namespace}")))
    }

    fn list_qdiscs(&self, namespace: &str, interface: &Interface) -> Result<Vec<TcObject>> {
        let state = self.state.read();
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.qdiscs.get(&interface.name))
            .cloned()
            .unwrap_or_default())
    }

    fn list_classes(&self, namespace: &str, interface: &Interface) -> Result<Vec<TcObject>> {
        let state = self.state.read();
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.classes.get(&interface.name))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_source_enumerates() {
        let source = FakeTcSource::new()
            .with_namespace(DEFAULT_NAMESPACE, vec![Interface::new(2, "eth0")])
            .with_qdisc(DEFAULT_NAMESPACE, "eth0", TcObject::new("fq_codel"))
            .with_class(DEFAULT_NAMESPACE, "eth0", TcObject::new("htb"));

        assert_eq!(source.list_namespaces().unwrap(), vec!["default"]);
        let ifaces = source.list_interfaces(DEFAULT_NAMESPACE).unwrap();
        assert_eq!(ifaces, vec![Interface::new(2, "eth0")]);
        assert_eq!(source.list_qdiscs(DEFAULT_NAMESPACE, &ifaces[0]).unwrap().len(), 1);
        assert_eq!(source.list_classes(DEFAULT_NAMESPACE, &ifaces[0]).unwrap()[0].kind, "htb");
    }

    #[test]
    fn test_fake_source_failures() {
        let source = FakeTcSource::new().with_namespace("blue", vec![]);
        source.fail_interfaces("blue");
        assert!(source.list_interfaces("blue").is_err());
        assert!(source.list_interfaces("missing").is_err());

        source.set_fail_namespaces(true);
        assert!(source.list_namespaces().is_err());
    }

    #[test]
    fn test_fake_source_unknown_device_has_no_objects() {
        let source = FakeTcSource::new().with_namespace(DEFAULT_NAMESPACE, vec![]);
        let qdiscs = source
            .list_qdiscs(DEFAULT_NAMESPACE, &Interface::new(9, "nope"))
            .unwrap();
        assert!(qdiscs.is_empty());
    }
}
