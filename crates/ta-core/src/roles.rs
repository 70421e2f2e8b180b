//! Roles and the capabilities they grant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    #[default]
    TrailAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    SubmitReports,
    ReadDashboard,
    ManageTrails,
    ApproveReports,
    ReadPrivateReports,
    ExportReports,
    ManageOptions,
}

const AGENT_CAPS: &[Capability] = &[
    Capability::Read,
    Capability::SubmitReports,
    Capability::ReadDashboard,
];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::TrailAgent => "trail_agent",
        }
    }

    /// Unrecognized role names get the least-privileged role.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "administrator" => Role::Administrator,
            _ => Role::TrailAgent,
        }
    }

    pub fn can(&self, cap: Capability) -> bool {
        match self {
            Role::Administrator => true,
            Role::TrailAgent => AGENT_CAPS.contains(&cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agents_submit_but_do_not_manage() {
        let agent = Role::TrailAgent;
        assert!(agent.can(Capability::SubmitReports));
        assert!(agent.can(Capability::ReadDashboard));
        assert!(!agent.can(Capability::ManageOptions));
        assert!(!agent.can(Capability::ApproveReports));
    }

    #[test]
    fn administrators_hold_everything() {
        assert!(Role::Administrator.can(Capability::ManageOptions));
        assert!(Role::Administrator.can(Capability::SubmitReports));
    }
}
