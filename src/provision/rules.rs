//! Baseline firewall rules applied to newly created security groups.

use crate::compute::{FlowDirection, Protocol, SecurityGroupRef, SecurityGroupRule};

/// Source networks every public rule is opened to.
pub const PUBLIC_NETWORKS: [&str; 2] = ["0.0.0.0/0", "::/0"];

/// Port range opened by a baseline rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RuleTemplate {
    /// Human-readable label.
    pub description: &'static str,
    /// Transport protocol.
    pub protocol: Protocol,
    /// First port of the range.
    pub start_port: u16,
    /// Last port of the range (inclusive).
    pub end_port: u16,
}

const fn rule(
    description: &'static str,
    protocol: Protocol,
    start_port: u16,
    end_port: u16,
) -> RuleTemplate {
    RuleTemplate {
        description,
        protocol,
        start_port,
        end_port,
    }
}

/// Rules reachable from anywhere.
pub const PUBLIC_RULES: [RuleTemplate; 9] = [
    rule("SSH", Protocol::Tcp, 22, 22),
    rule("Docker", Protocol::Tcp, 2376, 2376),
    rule("(Legacy) Standalone Swarm", Protocol::Tcp, 3376, 3376),
    rule("Rancher webhook", Protocol::Tcp, 8443, 8443),
    rule("Kubernetes API", Protocol::Tcp, 6443, 6443),
    rule("HTTP", Protocol::Tcp, 80, 80),
    rule("HTTPS", Protocol::Tcp, 443, 443),
    rule("NodePort range (TCP)", Protocol::Tcp, 30000, 32767),
    rule("NodePort range (UDP)", Protocol::Udp, 30000, 32767),
];

/// Rules reachable only from members of the same group.
pub const INTERNAL_RULES: [RuleTemplate; 9] = [
    rule("RKE2 supervisor API", Protocol::Tcp, 9345, 9345),
    rule("etcd client and peer", Protocol::Tcp, 2379, 2380),
    rule("Calico Typha", Protocol::Tcp, 5473, 5473),
    rule("kubelet and kube components", Protocol::Tcp, 10250, 10252),
    rule("kube-proxy", Protocol::Tcp, 10256, 10256),
    rule("Node exporter metrics", Protocol::Tcp, 9796, 9796),
    rule("Calico BGP", Protocol::Tcp, 179, 179),
    rule("Calico VXLAN", Protocol::Udp, 4789, 4789),
    rule("Flannel VXLAN", Protocol::Udp, 8472, 8472),
];

/// Expands the baseline for `group` into the ordered rule submissions:
/// each public rule once per network in [`PUBLIC_NETWORKS`], then each
/// internal rule sourced from the group itself.
#[must_use]
pub fn baseline_rules(group: &SecurityGroupRef) -> Vec<SecurityGroupRule> {
    let public = PUBLIC_RULES.iter().flat_map(|template| {
        PUBLIC_NETWORKS.iter().map(|network| SecurityGroupRule {
            description: Some(template.description.to_owned()),
            flow_direction: FlowDirection::Ingress,
            protocol: template.protocol,
            start_port: template.start_port,
            end_port: template.end_port,
            network: Some((*network).to_owned()),
            security_group: None,
        })
    });
    let internal = INTERNAL_RULES.iter().map(|template| SecurityGroupRule {
        description: Some(template.description.to_owned()),
        flow_direction: FlowDirection::Ingress,
        protocol: template.protocol,
        start_port: template.start_port,
        end_port: template.end_port,
        network: None,
        security_group: Some(group.clone()),
    });
    public.chain(internal).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    fn group() -> SecurityGroupRef {
        SecurityGroupRef {
            id: Uuid::new_v4(),
            name: String::from("exomachine"),
            visibility: String::from("private"),
        }
    }

    #[test]
    fn baseline_has_twenty_seven_ingress_rules() {
        let rules = baseline_rules(&group());

        assert_eq!(rules.len(), 27);
        assert!(
            rules
                .iter()
                .all(|rule| rule.flow_direction == FlowDirection::Ingress)
        );
    }

    #[test]
    fn public_rules_cover_both_address_families() {
        let rules = baseline_rules(&group());
        let ssh: Vec<_> = rules
            .iter()
            .filter(|rule| rule.start_port == 22)
            .filter_map(|rule| rule.network.as_deref())
            .collect();

        assert_eq!(ssh, ["0.0.0.0/0", "::/0"]);
    }

    #[test]
    fn internal_rules_reference_the_group() {
        let source = group();
        let rules = baseline_rules(&source);
        let internal: Vec<_> = rules
            .iter()
            .filter(|rule| rule.security_group.as_ref() == Some(&source))
            .collect();

        assert_eq!(internal.len(), INTERNAL_RULES.len());
        assert!(internal.iter().all(|rule| rule.network.is_none()));
    }

    #[rstest]
    #[case(Protocol::Tcp, 30000, 32767)]
    #[case(Protocol::Udp, 30000, 32767)]
    #[case(Protocol::Tcp, 2379, 2380)]
    #[case(Protocol::Tcp, 10250, 10252)]
    #[case(Protocol::Udp, 4789, 4789)]
    #[case(Protocol::Udp, 8472, 8472)]
    fn baseline_includes_port_range(
        #[case] protocol: Protocol,
        #[case] start_port: u16,
        #[case] end_port: u16,
    ) {
        let rules = baseline_rules(&group());

        assert!(rules.iter().any(|rule| rule.protocol == protocol
            && rule.start_port == start_port
            && rule.end_port == end_port));
    }

    #[test]
    fn port_ranges_are_well_formed() {
        assert!(
            PUBLIC_RULES
                .iter()
                .chain(INTERNAL_RULES.iter())
                .all(|template| template.start_port <= template.end_port)
        );
    }
}
