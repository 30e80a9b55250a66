//! Traffic-control object model.
//!
//! A [`TcObject`] is one qdisc or class as reported by the kernel: a kind
//! discriminator, up to two generic statistics blocks and an optional
//! kind-specific extended statistics payload ([`XStats`]).

use serde::{Deserialize, Deserializer, Serialize};

/// A network interface inside a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Kernel interface index.
    pub index: u32,
    /// Interface name, e.g. `eth0`.
    pub name: String,
}

impl Interface {
    /// Creates an interface descriptor.
    #[must_use]
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// Which objects of an interface a collector walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectScope {
    /// Qdiscs only.
    Qdiscs,
    /// Classes only.
    Classes,
}

/// Legacy statistics block. The only block that carries rate estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Bytes sent.
    pub bytes: u64,
    /// Packets sent.
    pub packets: u64,
    /// Packets dropped.
    pub drops: u64,
    /// Times the qdisc went over its limit.
    pub overlimits: u64,
    /// Rate estimate in bytes per second.
    pub bps: u64,
    /// Rate estimate in packets per second.
    pub pps: u64,
    /// Queue length in packets.
    pub qlen: u64,
    /// Backlog in bytes.
    pub backlog: u64,
}

/// Preferred statistics block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats2 {
    /// Bytes sent.
    pub bytes: u64,
    /// Packets sent.
    pub packets: u64,
    /// Packets dropped.
    pub drops: u64,
    /// Times the qdisc went over its limit.
    pub overlimits: u64,
    /// Queue length in packets.
    pub qlen: u64,
    /// Backlog in bytes.
    pub backlog: u64,
    /// Packets requeued.
    pub requeues: u64,
}

/// A qdisc or class with its statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TcObject {
    /// Kind discriminator, e.g. `htb`.
    pub kind: String,
    /// Handle in `major:minor` notation.
    pub handle: String,
    /// Parent handle, `root` for root qdiscs.
    pub parent: String,
    /// Legacy statistics.
    pub stats: Option<Stats>,
    /// Preferred statistics.
    pub stats2: Option<Stats2>,
    /// Kind-specific extended statistics.
    pub xstats: Option<XStats>,
}

impl TcObject {
    /// Creates an object of `kind` with no statistics attached.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Sets the handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = handle.into();
        self
    }

    /// Sets the parent handle.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    /// Attaches a legacy statistics block.
    #[must_use]
    pub const fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Attaches a preferred statistics block.
    #[must_use]
    pub const fn with_stats2(mut self, stats2: Stats2) -> Self {
        self.stats2 = Some(stats2);
        self
    }

    /// Attaches extended statistics.
    #[must_use]
    pub fn with_xstats(mut self, xstats: impl Into<XStats>) -> Self {
        self.xstats = Some(xstats.into());
        self
    }
}

/// Named numeric lookup over one kind's extended statistics.
pub trait ExtendedStats: Sized + 'static {
    /// Kind discriminator these statistics belong to.
    const KIND: &'static str;
    /// Field names with their help text, in declaration order.
    const FIELDS: &'static [(&'static str, &'static str)];
    /// Every key accepted when deserializing, aliases included.
    const KEYS: &'static [&'static str];

    /// Returns the value of `name`, or `None` if the kind has no such field.
    fn field(&self, name: &str) -> Option<f64>;

    /// Borrows these statistics out of the union when the variant matches.
    fn from_xstats(xstats: &XStats) -> Option<&Self>;
}

/// Conversion of a statistics field into a gauge value.
trait GaugeValue {
    fn gauge(self) -> f64;
}

impl GaugeValue for u64 {
    fn gauge(self) -> f64 {
        self as f64
    }
}

impl GaugeValue for i64 {
    fn gauge(self) -> f64 {
        self as f64
    }
}

impl GaugeValue for f64 {
    fn gauge(self) -> f64 {
        self
    }
}

mod lenient {
    //! Accepts integers, floats and booleans for any numeric field.

    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Flag(bool),
    }

    pub(super) trait FromNumber: Sized {
        fn from_u64(v: u64) -> Self;
        fn from_i64(v: i64) -> Self;
        fn from_f64(v: f64) -> Self;
    }

    impl FromNumber for u64 {
        fn from_u64(v: u64) -> Self {
            v
        }
        fn from_i64(v: i64) -> Self {
            v.max(0) as u64
        }
        fn from_f64(v: f64) -> Self {
            v.max(0.0) as u64
        }
    }

    impl FromNumber for i64 {
        fn from_u64(v: u64) -> Self {
            i64::try_from(v).unwrap_or(i64::MAX)
        }
        fn from_i64(v: i64) -> Self {
            v
        }
        fn from_f64(v: f64) -> Self {
            v as i64
        }
    }

    impl FromNumber for f64 {
        fn from_u64(v: u64) -> Self {
            v as f64
        }
        fn from_i64(v: i64) -> Self {
            v as f64
        }
        fn from_f64(v: f64) -> Self {
            v
        }
    }

    pub(super) fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromNumber,
    {
        Ok(match Number::deserialize(deserializer)? {
            Number::Unsigned(v) => T::from_u64(v),
            Number::Signed(v) => T::from_i64(v),
            Number::Float(v) => T::from_f64(v),
            Number::Flag(v) => T::from_u64(u64::from(v)),
        })
    }
}

macro_rules! xstats {
    (
        $(#[$meta:meta])*
        $name:ident => $variant:ident, $kind:literal {
            $( $field:ident : $ty:ty $( | $alias:literal )* => $help:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $(
                #[doc = $help]
                $( #[serde(alias = $alias)] )*
                #[serde(deserialize_with = "lenient::number")]
                pub $field: $ty,
            )+
        }

        impl ExtendedStats for $name {
            const KIND: &'static str = $kind;
            const FIELDS: &'static [(&'static str, &'static str)] =
                &[ $( (stringify!($field), $help) ),+ ];
            const KEYS: &'static [&'static str] =
                &[ $( stringify!($field), $( $alias, )* )+ ];

            fn field(&self, name: &str) -> Option<f64> {
                match name {
                    $( stringify!($field) => Some(self.$field.gauge()), )+
                    _ => None,
                }
            }

            fn from_xstats(xstats: &XStats) -> Option<&Self> {
                match xstats {
                    XStats::$variant(stats) => Some(stats),
                    _ => None,
                }
            }
        }

        impl From<$name> for XStats {
            fn from(stats: $name) -> Self {
                Self::$variant(stats)
            }
        }
    };
}

xstats! {
    /// Extended statistics of the `codel` qdisc.
    CodelXStats => Codel, "codel" {
        ce_mark: u64 => "Packets marked with CE instead of being dropped",
        count: u64 => "Packets dropped or marked since entering the dropping state",
        drop_next: i64 => "Time until the next drop in microseconds",
        drop_overlimit: u64 => "Packets dropped because the queue exceeded its limit",
        dropping: u64 => "Whether codel is in the dropping state",
        ecn_mark: u64 => "Packets marked with ECN",
        ldelay: u64 => "Sojourn time of the last dequeued packet in microseconds",
        max_packet: u64 | "maxpacket" => "Largest packet seen in bytes",
    }
}

xstats! {
    /// Extended statistics of `cbq` classes.
    CbqXStats => Cbq, "cbq" {
        avg_idle: i64 | "avgidle" => "Average idle time",
        borrows: u64 | "borrowed" => "Times the class borrowed bandwidth",
        overactions: u64 => "Times the overlimit action ran",
        undertime: i64 => "Time until the class is allowed to send again",
    }
}

xstats! {
    /// Extended statistics of the `choke` qdisc.
    ChokeXStats => Choke, "choke" {
        early: u64 => "Packets dropped early by the random detector",
        marked: u64 => "Packets marked with ECN",
        matched: u64 => "Packets dropped because they matched a random queued packet",
        other: u64 => "Packets dropped for other reasons",
        pdrop: u64 => "Packets dropped because the queue was full",
    }
}

xstats! {
    /// Extended statistics of the `fq` qdisc.
    FqXStats => Fq, "fq" {
        gc_flows: u64 | "gc" => "Flows reclaimed by garbage collection",
        high_prio_packets: u64 | "highprio" => "Packets sent through the high priority band",
        tcp_retrans: u64 => "TCP retransmissions seen",
        throttled: u64 => "Times a flow was throttled",
        throttled_flows: u64 => "Flows currently throttled",
        flows_plimit: u64 => "Packets dropped due to the per-flow limit",
        pkts_too_long: u64 => "Packets dropped for exceeding the maximum size",
        allocation_errors: u64 | "alloc_errors" => "Flow allocation failures",
        time_next_delayed_flow: i64 | "next_packet_delay" => "Time until the next delayed flow is released in nanoseconds",
        flows: u64 => "Flows tracked",
        inactive_flows: u64 | "inactive" => "Flows without queued packets",
        unthrottle_latency_ns: u64 | "unthrottle_latency" => "Average unthrottle latency in nanoseconds",
        ce_mark: u64 => "Packets marked with CE",
        horizon_drops: u64 => "Packets dropped beyond the time horizon",
        horizon_caps: u64 => "Packets capped to the time horizon",
    }
}

xstats! {
    /// Extended statistics of the `fq_codel` qdisc.
    FqCodelXStats => FqCodel, "fq_codel" {
        maxpacket: u64 => "Largest packet seen in bytes",
        drop_overlimit: u64 => "Packets dropped because the queue exceeded its limit",
        ecn_mark: u64 => "Packets marked with ECN",
        new_flow_count: u64 => "Flows created",
        new_flows_len: u64 => "Flows in the new flow list",
        old_flows_len: u64 => "Flows in the old flow list",
        ce_mark: u64 => "Packets marked with CE",
        memory_usage: u64 | "memory_used" => "Memory in use in bytes",
        drop_overmemory: u64 => "Packets dropped because the memory limit was reached",
    }
}

xstats! {
    /// Extended statistics of `hfsc` classes.
    HfscXStats => Hfsc, "hfsc" {
        level: u64 => "Class level in the hierarchy",
        period: u64 => "Current period",
        work: u64 => "Total work done in bytes",
        rtwork: u64 => "Work done under the real-time criterion in bytes",
    }
}

xstats! {
    /// Extended statistics of `htb` classes.
    HtbXStats => Htb, "htb" {
        lends: u64 | "lended" => "Packets sent while lending bandwidth",
        borrows: u64 | "borrowed" => "Packets sent with borrowed bandwidth",
        giants: u64 => "Packets larger than the configured MTU",
        tokens: i64 => "Tokens available for the rate",
        ctokens: i64 => "Tokens available for the ceil",
    }
}

xstats! {
    /// Extended statistics of the `pie` qdisc.
    PieXStats => Pie, "pie" {
        prob: f64 => "Current drop probability",
        delay: u64 => "Current queue delay in microseconds",
        avg_dq_rate: u64 => "Average dequeue rate in bytes per second",
        packets_in: u64 | "pkts_in" => "Packets enqueued",
        dropped: u64 => "Packets dropped",
        overlimit: u64 => "Packets dropped because the queue exceeded its limit",
        maxq: u64 => "Maximum queue size seen",
        ecn_mark: u64 => "Packets marked with ECN",
    }
}

xstats! {
    /// Extended statistics of the `red` qdisc.
    RedXStats => Red, "red" {
        early: u64 => "Packets dropped early",
        pdrop: u64 => "Packets dropped because the queue was full",
        other: u64 => "Packets dropped for other reasons",
        marked: u64 => "Packets marked with ECN",
    }
}

xstats! {
    /// Extended statistics of the `sfb` qdisc.
    SfbXStats => Sfb, "sfb" {
        early_drop: u64 | "earlydrop" => "Packets dropped early",
        penalty_drop: u64 | "penaltydrop" => "Packets dropped by the penalty box",
        bucket_drop: u64 | "bucketdrop" => "Packets dropped because a bucket was full",
        queue_drop: u64 | "queuedrop" => "Packets dropped because the queue was full",
        child_drop: u64 | "childdrop" => "Packets dropped by the child qdisc",
        marked: u64 => "Packets marked with ECN",
        maxqlen: u64 => "Maximum bucket queue length",
        maxprob: f64 => "Maximum marking probability",
        avgprob: f64 => "Average marking probability",
    }
}

xstats! {
    /// Extended statistics of `sfq` classes.
    SfqXStats => Sfq, "sfq" {
        allot: i64 => "Remaining byte allotment of the flow",
    }
}

/// Kind-specific extended statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum XStats {
    /// `codel`
    Codel(CodelXStats),
    /// `cbq`
    Cbq(CbqXStats),
    /// `choke`
    Choke(ChokeXStats),
    /// `fq`
    Fq(FqXStats),
    /// `fq_codel`
    FqCodel(FqCodelXStats),
    /// `hfsc`
    Hfsc(HfscXStats),
    /// `htb`
    Htb(HtbXStats),
    /// `pie`
    Pie(PieXStats),
    /// `red`
    Red(RedXStats),
    /// `sfb`
    Sfb(SfbXStats),
    /// `sfq`
    Sfq(SfqXStats),
}

impl XStats {
    /// Kind discriminator of the payload.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Codel(_) => CodelXStats::KIND,
            Self::Cbq(_) => CbqXStats::KIND,
            Self::Choke(_) => ChokeXStats::KIND,
            Self::Fq(_) => FqXStats::KIND,
            Self::FqCodel(_) => FqCodelXStats::KIND,
            Self::Hfsc(_) => HfscXStats::KIND,
            Self::Htb(_) => HtbXStats::KIND,
            Self::Pie(_) => PieXStats::KIND,
            Self::Red(_) => RedXStats::KIND,
            Self::Sfb(_) => SfbXStats::KIND,
            Self::Sfq(_) => SfqXStats::KIND,
        }
    }

    /// Keys that identify `kind`'s extended statistics in a flat record,
    /// or `None` for kinds without extended statistics.
    #[must_use]
    pub fn keys_for(kind: &str) -> Option<&'static [&'static str]> {
        Some(match kind {
            CodelXStats::KIND => CodelXStats::KEYS,
            CbqXStats::KIND => CbqXStats::KEYS,
            ChokeXStats::KIND => ChokeXStats::KEYS,
            FqXStats::KIND => FqXStats::KEYS,
            FqCodelXStats::KIND => FqCodelXStats::KEYS,
            HfscXStats::KIND => HfscXStats::KEYS,
            HtbXStats::KIND => HtbXStats::KEYS,
            PieXStats::KIND => PieXStats::KEYS,
            RedXStats::KIND => RedXStats::KEYS,
            SfbXStats::KIND => SfbXStats::KEYS,
            SfqXStats::KIND => SfqXStats::KEYS,
            _ => return None,
        })
    }

    /// Deserializes the extended statistics of `kind` from a flat record.
    /// Unknown kinds yield `Ok(None)`.
    pub fn deserialize_for_kind<'de, D>(
        kind: &str,
        deserializer: D,
    ) -> Result<Option<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Some(match kind {
            CodelXStats::KIND => CodelXStats::deserialize(deserializer)?.into(),
            CbqXStats::KIND => CbqXStats::deserialize(deserializer)?.into(),
            ChokeXStats::KIND => ChokeXStats::deserialize(deserializer)?.into(),
            FqXStats::KIND => FqXStats::deserialize(deserializer)?.into(),
            FqCodelXStats::KIND => FqCodelXStats::deserialize(deserializer)?.into(),
            HfscXStats::KIND => HfscXStats::deserialize(deserializer)?.into(),
            HtbXStats::KIND => HtbXStats::deserialize(deserializer)?.into(),
            PieXStats::KIND => PieXStats::deserialize(deserializer)?.into(),
            RedXStats::KIND => RedXStats::deserialize(deserializer)?.into(),
            SfbXStats::KIND => SfbXStats::deserialize(deserializer)?.into(),
            SfqXStats::KIND => SfqXStats::deserialize(deserializer)?.into(),
            _ => return Ok(None),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_by_name() {
        let htb = HtbXStats {
            lends: 3,
            borrows: 7,
            giants: 0,
            tokens: -25,
            ctokens: 400,
        };
        assert_eq!(htb.field("borrows"), Some(7.0));
        assert_eq!(htb.field("tokens"), Some(-25.0));
        assert_eq!(htb.field("no_such_field"), None);
    }

    #[test]
    fn test_from_xstats_matches_variant_only() {
        let xstats: XStats = RedXStats {
            early: 1,
            ..RedXStats::default()
        }
        .into();
        assert!(RedXStats::from_xstats(&xstats).is_some());
        assert!(ChokeXStats::from_xstats(&xstats).is_none());
        assert_eq!(xstats.kind(), "red");
    }

    #[test]
    fn test_fields_table_matches_lookup() {
        let stats = FqXStats::default();
        for (name, help) in FqXStats::FIELDS {
            assert!(stats.field(name).is_some(), "{name} not addressable");
            assert!(!help.is_empty());
        }
    }

    #[test]
    fn test_keys_include_aliases() {
        assert!(HtbXStats::KEYS.contains(&"lends"));
        assert!(HtbXStats::KEYS.contains(&"lended"));
        assert_eq!(XStats::keys_for("mq"), None);
    }

    #[test]
    fn test_deserialize_flat_record_with_aliases() {
        let record = serde_json::json!({
            "kind": "codel",
            "count": 4,
            "ldelay": 120,
            "dropping": true,
            "maxpacket": 1514,
            "drop_next": -3
        });
        let xstats = XStats::deserialize_for_kind("codel", record).unwrap().unwrap();
        let codel = CodelXStats::from_xstats(&xstats).unwrap();
        assert_eq!(codel.count, 4);
        assert_eq!(codel.dropping, 1);
        assert_eq!(codel.max_packet, 1514);
        assert_eq!(codel.drop_next, -3);
    }

    #[test]
    fn test_deserialize_float_probability() {
        let record = serde_json::json!({ "prob": 0.25, "delay": 9 });
        let xstats = XStats::deserialize_for_kind("pie", record).unwrap().unwrap();
        let pie = PieXStats::from_xstats(&xstats).unwrap();
        assert!((pie.prob - 0.25).abs() < f64::EPSILON);
        assert_eq!(pie.delay, 9);
    }

    #[test]
    fn test_deserialize_unknown_kind() {
        let record = serde_json::json!({ "bytes": 1 });
        assert_eq!(XStats::deserialize_for_kind("mq", record).unwrap(), None);
    }
}
