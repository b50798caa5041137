//! SafetyBoundary and ImpactReport data model.

use crate::ids::ModuleId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyBoundary {
    pub allowed_paths: Vec<String>,
    pub forbidden_paths: Vec<String>,
    pub allowed_module_ids: Vec<ModuleId>,
    pub forbidden_module_ids: Vec<ModuleId>,
}

impl SafetyBoundary {
    /// Invariant: forbidden dominates allowed on overlap.
    pub fn module_allowed(&self, module_id: &ModuleId) -> bool {
        if self.forbidden_module_ids.contains(module_id) {
            return false;
        }
        self.allowed_module_ids.is_empty() || self.allowed_module_ids.contains(module_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    None,
    Additive,
    Intrusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleImpact {
    pub module_id: ModuleId,
    pub change_kind: ChangeKind,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub per_module: Vec<ModuleImpact>,
    pub overall_risk_level: RiskLevel,
    pub requires_human_approval: bool,
    pub safety_boundary: SafetyBoundary,
}

impl ImpactReport {
    /// `overallRiskLevel = max(perModule.risk)`; a report with no affected
    /// modules is `Low` risk by definition.
    pub fn compute_overall(per_module: &[ModuleImpact]) -> RiskLevel {
        per_module
            .iter()
            .map(|m| m.risk)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    pub fn requires_approval(overall: RiskLevel) -> bool {
        matches!(overall, RiskLevel::High | RiskLevel::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_dominates_allowed() {
        let boundary = SafetyBoundary {
            allowed_module_ids: vec![ModuleId::from("m1")],
            forbidden_module_ids: vec![ModuleId::from("m1")],
            ..Default::default()
        };
        assert!(!boundary.module_allowed(&ModuleId::from("m1")));
    }

    #[test]
    fn empty_allow_list_permits_anything_not_forbidden() {
        let boundary = SafetyBoundary {
            forbidden_module_ids: vec![ModuleId::from("m2")],
            ..Default::default()
        };
        assert!(boundary.module_allowed(&ModuleId::from("m1")));
        assert!(!boundary.module_allowed(&ModuleId::from("m2")));
    }

    #[test]
    fn overall_risk_is_max_of_per_module() {
        let modules = vec![
            ModuleImpact {
                module_id: ModuleId::from("a"),
                change_kind: ChangeKind::Additive,
                risk: RiskLevel::Low,
            },
            ModuleImpact {
                module_id: ModuleId::from("b"),
                change_kind: ChangeKind::Intrusive,
                risk: RiskLevel::Critical,
            },
        ];
        assert_eq!(ImpactReport::compute_overall(&modules), RiskLevel::Critical);
    }

    #[test]
    fn approval_required_only_for_high_or_critical() {
        assert!(!ImpactReport::requires_approval(RiskLevel::Medium));
        assert!(ImpactReport::requires_approval(RiskLevel::High));
        assert!(ImpactReport::requires_approval(RiskLevel::Critical));
    }

    #[test]
    fn empty_impact_is_low_risk() {
        assert_eq!(ImpactReport::compute_overall(&[]), RiskLevel::Low);
    }
}
