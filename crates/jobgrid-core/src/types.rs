//! Shared types used across jobgrid crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which allocation strategy carves a request out of the node inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Whole request on the first node with enough free CPUs.
    #[default]
    SingleNode,
    /// Even split across every node, remainder to the first nodes.
    RoundRobin,
    /// Greedy fill of nodes in inventory order.
    GeneralMultiNode,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::SingleNode,
        PolicyKind::RoundRobin,
        PolicyKind::GeneralMultiNode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::SingleNode => "single_node",
            PolicyKind::RoundRobin => "round_robin",
            PolicyKind::GeneralMultiNode => "general_multi_node",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_node" | "single" => Ok(PolicyKind::SingleNode),
            "round_robin" | "rr" => Ok(PolicyKind::RoundRobin),
            "general_multi_node" | "multi_node" | "general" => Ok(PolicyKind::GeneralMultiNode),
            other => Err(format!(
                "unknown allocation policy '{other}' (expected single_node, round_robin or general_multi_node)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_kind_parses_aliases() {
        assert_eq!("single_node".parse::<PolicyKind>(), Ok(PolicyKind::SingleNode));
        assert_eq!("round-robin".parse::<PolicyKind>(), Ok(PolicyKind::RoundRobin));
        assert_eq!("RR".parse::<PolicyKind>(), Ok(PolicyKind::RoundRobin));
        assert_eq!("general".parse::<PolicyKind>(), Ok(PolicyKind::GeneralMultiNode));
        assert!("best_fit".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn policy_kind_display_round_trips() {
        for kind in PolicyKind::ALL {
            assert_eq!(kind.to_string().parse::<PolicyKind>(), Ok(kind));
        }
    }

    #[test]
    fn policy_kind_serde_is_snake_case() {
        let json = serde_json::to_string(&PolicyKind::GeneralMultiNode).unwrap();
        assert_eq!(json, "\"general_multi_node\"");
    }
}
