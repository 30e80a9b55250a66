//! Metric descriptors, samples and the sink collectors write into.

use std::sync::Arc;

use tracing::warn;

/// Identifies a metric family independent of label values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new<L, S>(name: impl Into<String>, help: impl Into<String>, label_names: L) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            help: help.into(),
            label_names: label_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Fully qualified metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Ordered label names.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// One observation produced during a collection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The family this sample belongs to.
    pub descriptor: Arc<MetricDescriptor>,
    /// Observed value.
    pub value: f64,
    /// Label values, positionally matching the descriptor's label names.
    pub label_values: Vec<String>,
}

impl Sample {
    /// Pairs label names with label values.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptor
            .label_names()
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Returns the value of a single label.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

/// Receives samples for one collection pass. Each scrape owns its own sink.
#[derive(Debug, Default)]
pub struct MetricSink {
    samples: Vec<Sample>,
}

impl MetricSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. Samples whose label arity does not match the
    /// descriptor are dropped.
    pub fn push(
        &mut self,
        descriptor: &Arc<MetricDescriptor>,
        value: f64,
        label_values: Vec<String>,
    ) {
        if label_values.len() != descriptor.label_names().len() {
            warn!(
                metric = descriptor.name(),
                expected = descriptor.label_names().len(),
                got = label_values.len(),
                "dropping sample with mismatched labels"
            );
            return;
        }
        self.samples.push(Sample {
            descriptor: Arc::clone(descriptor),
            value,
            label_values,
        });
    }

    /// All samples in emission order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no sample has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drops every sample after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.samples.truncate(len);
    }

    /// Samples belonging to the metric `name`.
    pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Sample> + 'a {
        self.samples
            .iter()
            .filter(move |s| s.descriptor.name() == name)
    }

    /// Groups samples by descriptor, ordered by first appearance.
    #[must_use]
    pub fn families(&self) -> Vec<(&MetricDescriptor, Vec<&Sample>)> {
        let mut families: Vec<(&MetricDescriptor, Vec<&Sample>)> = Vec::new();
        for sample in &self.samples {
            match families
                .iter_mut()
                .find(|(d, _)| d.name() == sample.descriptor.name())
            {
                Some((_, members)) => members.push(sample),
                None => families.push((sample.descriptor.as_ref(), vec![sample])),
            }
        }
        families
    }

    /// Consumes the sink and returns its samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> Arc<MetricDescriptor> {
        Arc::new(MetricDescriptor::new(name, "help", ["namespace", "device"]))
    }

    #[test]
    fn test_push_and_labels() {
        let desc = descriptor("qdisc_bytes_total");
        let mut sink = MetricSink::new();
        sink.push(&desc, 42.0, vec!["default".into(), "eth0".into()]);

        assert_eq!(sink.len(), 1);
        let sample = &sink.samples()[0];
        assert_eq!(sample.label("device"), Some("eth0"));
        assert_eq!(sample.label("kind"), None);
        assert_eq!(
            sample.labels().collect::<Vec<_>>(),
            vec![("namespace", "default"), ("device", "eth0")]
        );
    }

    #[test]
    fn test_push_rejects_label_arity_mismatch() {
        let desc = descriptor("qdisc_bytes_total");
        let mut sink = MetricSink::new();
        sink.push(&desc, 1.0, vec!["default".into()]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_families_group_in_first_seen_order() {
        let a = descriptor("a");
        let b = descriptor("b");
        let mut sink = MetricSink::new();
        sink.push(&b, 1.0, vec!["ns".into(), "eth0".into()]);
        sink.push(&a, 2.0, vec!["ns".into(), "eth0".into()]);
        sink.push(&b, 3.0, vec!["ns".into(), "eth1".into()]);

        let families = sink.families();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].0.name(), "b");
        assert_eq!(families[0].1.len(), 2);
        assert_eq!(families[1].0.name(), "a");
    }

    #[test]
    fn test_truncate() {
        let a = descriptor("a");
        let mut sink = MetricSink::new();
        for i in 0..5 {
            sink.push(&a, f64::from(i), vec!["ns".into(), "eth0".into()]);
        }
        sink.truncate(2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.by_name("a").count(), 2);
    }
}
