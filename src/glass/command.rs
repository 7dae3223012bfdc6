//! Device dialect command templates.
//!
//! One fixed template per `(query kind, address family)` pair. Adding a
//! query kind or dialect variant is a table change, not a code change.
//!
//! `{source}` expands to the `-a <address>` clause (dropped together with
//! its leading space when the source is optional and absent), `{target}`
//! to the probe target, `{hops}` to the hop ceiling.

use crate::glass::query::QueryKind;
use crate::inventory::AddressFamily;

/// Whether a template needs a source-address identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Request must name a source identity; validated before anything runs.
    Required,
    /// Used when given, omitted otherwise.
    Optional,
    /// The dialect has no source parameter.
    Unused,
}

/// A single dialect command template.
#[derive(Debug)]
pub struct CommandTemplate {
    template: &'static str,
    pub source: SourcePolicy,
}

impl CommandTemplate {
    /// Render the command line for a concrete target.
    pub fn render(&self, target: &str, source: Option<&str>, max_hops: u32) -> String {
        let with_source = match source {
            Some(addr) => self.template.replace("{source}", &format!("-a {addr}")),
            None => self.template.replace(" {source}", ""),
        };
        with_source
            .replace("{target}", target)
            .replace("{hops}", &max_hops.to_string())
    }
}

/// Default hop ceiling for path traces.
pub const DEFAULT_MAX_HOPS: u32 = 30;

type Key = (QueryKind, AddressFamily);

const TEMPLATES: &[(Key, CommandTemplate)] = &[
    (
        (QueryKind::Ping, AddressFamily::Ipv4),
        CommandTemplate {
            template: "ping -c 30 -m 1 {source} {target}",
            source: SourcePolicy::Required,
        },
    ),
    (
        (QueryKind::Ping, AddressFamily::Ipv6),
        CommandTemplate {
            template: "ping ipv6 -c 30 -m 1 {source} {target}",
            source: SourcePolicy::Required,
        },
    ),
    (
        (QueryKind::Traceroute, AddressFamily::Ipv4),
        CommandTemplate {
            template: "tracert -as {source} -w 1000 -q 1 -m {hops} {target}",
            source: SourcePolicy::Optional,
        },
    ),
    (
        (QueryKind::Traceroute, AddressFamily::Ipv6),
        CommandTemplate {
            template: "tracert ipv6 {source} -w 1000 -q 1 -m {hops} {target}",
            source: SourcePolicy::Optional,
        },
    ),
    (
        (QueryKind::Bgp, AddressFamily::Ipv4),
        CommandTemplate {
            template: "display bgp routing-table {target} | no-more",
            source: SourcePolicy::Unused,
        },
    ),
    (
        (QueryKind::Bgp, AddressFamily::Ipv6),
        CommandTemplate {
            template: "display bgp ipv6 routing-table {target} | no-more",
            source: SourcePolicy::Unused,
        },
    ),
    (
        (QueryKind::BgpSummary, AddressFamily::Ipv4),
        CommandTemplate {
            template: "display bgp routing-table {target} as-path | no-more",
            source: SourcePolicy::Unused,
        },
    ),
    (
        (QueryKind::BgpSummary, AddressFamily::Ipv6),
        CommandTemplate {
            template: "display bgp ipv6 routing-table {target} as-path | no-more",
            source: SourcePolicy::Unused,
        },
    ),
];

/// Look up the template for a query kind and target family.
///
/// The table covers every combination, so this only returns `None` if a
/// kind is added without its templates.
pub fn template_for(kind: QueryKind, family: AddressFamily) -> Option<&'static CommandTemplate> {
    TEMPLATES
        .iter()
        .find(|(key, _)| *key == (kind, family))
        .map(|(_, template)| template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_family_pair_has_a_template() {
        for kind in [
            QueryKind::Ping,
            QueryKind::Traceroute,
            QueryKind::Bgp,
            QueryKind::BgpSummary,
        ] {
            for family in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
                assert!(template_for(kind, family).is_some(), "{kind:?}/{family:?}");
            }
        }
    }

    #[test]
    fn ping_embeds_source_and_target() {
        let template = template_for(QueryKind::Ping, AddressFamily::Ipv4).unwrap();
        assert_eq!(
            template.render("8.8.8.8", Some("192.0.2.1"), DEFAULT_MAX_HOPS),
            "ping -c 30 -m 1 -a 192.0.2.1 8.8.8.8"
        );
        assert_eq!(template.source, SourcePolicy::Required);
    }

    #[test]
    fn ping_v6_uses_the_ipv6_dialect() {
        let template = template_for(QueryKind::Ping, AddressFamily::Ipv6).unwrap();
        assert_eq!(
            template.render("2001:4860::8888", Some("2001:db8::1"), DEFAULT_MAX_HOPS),
            "ping ipv6 -c 30 -m 1 -a 2001:db8::1 2001:4860::8888"
        );
    }

    #[test]
    fn traceroute_drops_absent_optional_source() {
        let template = template_for(QueryKind::Traceroute, AddressFamily::Ipv4).unwrap();
        assert_eq!(
            template.render("8.8.8.8", None, 30),
            "tracert -as -w 1000 -q 1 -m 30 8.8.8.8"
        );
        assert_eq!(
            template.render("8.8.8.8", Some("192.0.2.1"), 16),
            "tracert -as -a 192.0.2.1 -w 1000 -q 1 -m 16 8.8.8.8"
        );
    }

    #[test]
    fn bgp_summary_adds_as_path_detail() {
        let template = template_for(QueryKind::BgpSummary, AddressFamily::Ipv6).unwrap();
        assert_eq!(
            template.render("2001:db8::/32", None, DEFAULT_MAX_HOPS),
            "display bgp ipv6 routing-table 2001:db8::/32 as-path | no-more"
        );
    }
}
