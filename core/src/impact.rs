//! ImpactAnalyzer.
//!
//! Scores the blast radius of a proposed change before a worker starts
//! executing it, following the same "extract factors, then classify risk"
//! shape as the teacher's pre-routing classifier: count signals, derive a
//! `RiskLevel` from thresholds, and attach a short rationale rather than a
//! bare score.

use crate::model::{Blueprint, ChangeKind, ImpactReport, Module, ModuleImpact, RiskLevel, SafetyBoundary};
use std::collections::{HashMap, HashSet};

/// Per-module signals the analyzer collects before scoring.
#[derive(Debug, Clone, Default)]
pub struct ModuleChangeSignals {
    pub files_touched: usize,
    pub touches_public_interface: bool,
    pub touches_dependency_graph: bool,
    pub removes_responsibility: bool,
}

pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// `changeKind` for a module: `None` with no signals, `Intrusive` when
    /// the change touches a public interface, removes a responsibility, or
    /// reaches into the module dependency graph; `Additive` otherwise.
    fn classify_change_kind(signals: &ModuleChangeSignals) -> ChangeKind {
        if signals.files_touched == 0 {
            return ChangeKind::None;
        }
        if signals.touches_public_interface
            || signals.touches_dependency_graph
            || signals.removes_responsibility
        {
            ChangeKind::Intrusive
        } else {
            ChangeKind::Additive
        }
    }

    /// Risk scales with change kind and how many *other* modules transitively
    /// depend on the changed module — an intrusive change to a module three
    /// other modules depend on is worse than the same change to a leaf.
    fn classify_risk(kind: ChangeKind, dependent_count: usize) -> RiskLevel {
        match (kind, dependent_count) {
            (ChangeKind::None, _) => RiskLevel::Low,
            (ChangeKind::Additive, 0) => RiskLevel::Low,
            (ChangeKind::Additive, _) => RiskLevel::Medium,
            (ChangeKind::Intrusive, 0) => RiskLevel::Medium,
            (ChangeKind::Intrusive, 1..=2) => RiskLevel::High,
            (ChangeKind::Intrusive, _) => RiskLevel::Critical,
        }
    }

    /// Count of modules that declare a (possibly transitive) dependency on
    /// `target`, via reverse BFS over the blueprint's dependency edges.
    fn dependent_count(blueprint: &Blueprint, target: &Module) -> usize {
        let mut reverse_edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for module in &blueprint.modules {
            for dep in &module.dependencies {
                reverse_edges
                    .entry(dep.as_str())
                    .or_default()
                    .push(module.id.as_str());
            }
        }

        let mut seen = HashSet::new();
        let mut queue = vec![target.id.as_str()];
        while let Some(id) = queue.pop() {
            if let Some(dependents) = reverse_edges.get(id) {
                for dependent in dependents {
                    if seen.insert(*dependent) {
                        queue.push(dependent);
                    }
                }
            }
        }
        seen.len()
    }

    /// Per-module keyword score for a free-text requirement: exact module
    /// name mention outweighs a responsibility-substring hit, which in turn
    /// outweighs a bare tech-stack mention.
    fn score_module(text_lower: &str, words: &HashSet<&str>, module: &Module) -> usize {
        let mut score = 0;
        if words.contains(module.name.to_lowercase().as_str()) {
            score += 5;
        }
        if module
            .responsibilities
            .iter()
            .any(|r| text_lower.contains(&r.to_lowercase()))
        {
            score += 2;
        }
        if module
            .tech_stack
            .iter()
            .any(|t| text_lower.contains(&t.to_lowercase()))
        {
            score += 1;
        }
        score
    }

    /// Maps a free-text requirement onto the modules it touches by keyword
    /// score (exact name match, then responsibility substring, then
    /// tech-stack match), derives `ModuleChangeSignals` from which of those
    /// matched, and scores the resulting `ImpactReport` exactly as `analyze`
    /// does for caller-supplied signals.
    pub fn analyze_requirement(
        &self,
        text: &str,
        blueprint: &Blueprint,
        base_boundary: SafetyBoundary,
    ) -> ImpactReport {
        let text_lower = text.to_lowercase();
        let words: HashSet<&str> = text_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let removal_intent = ["remove", "delete", "deprecate", "drop"]
            .iter()
            .any(|k| words.contains(k));

        let mut signals = HashMap::new();
        for module in &blueprint.modules {
            let exact_name = words.contains(module.name.to_lowercase().as_str());
            let score = Self::score_module(&text_lower, &words, module);
            if score == 0 {
                continue;
            }
            let interface_mentioned = module
                .interfaces
                .iter()
                .any(|i| text_lower.contains(&i.id.to_lowercase()));
            let responsibility_mentioned = module
                .responsibilities
                .iter()
                .any(|r| text_lower.contains(&r.to_lowercase()));

            signals.insert(
                module.id.as_str().to_string(),
                ModuleChangeSignals {
                    files_touched: score,
                    touches_public_interface: exact_name || interface_mentioned,
                    touches_dependency_graph: exact_name
                        && module
                            .tech_stack
                            .iter()
                            .any(|t| text_lower.contains(&t.to_lowercase())),
                    removes_responsibility: removal_intent && responsibility_mentioned,
                },
            );
        }

        self.analyze(blueprint, &signals, base_boundary)
    }

    /// `base_boundary` carries caller-level restrictions (e.g. a
    /// repo-wide forbidden-paths list) that apply regardless of which
    /// modules a change touches. The returned report's `safety_boundary`
    /// additionally restricts writes to the affected modules' roots,
    /// unless the overall risk is `Critical`, in which case no module
    /// allowlist is derived at all and a reviewer signal is required via
    /// `requires_human_approval` before any write proceeds.
    pub fn analyze(
        &self,
        blueprint: &Blueprint,
        signals: &HashMap<String, ModuleChangeSignals>,
        base_boundary: SafetyBoundary,
    ) -> ImpactReport {
        let mut per_module = Vec::new();
        for module in &blueprint.modules {
            let module_signals = signals.get(module.id.as_str()).cloned().unwrap_or_default();
            let kind = Self::classify_change_kind(&module_signals);
            if kind == ChangeKind::None {
                continue;
            }
            let dependents = Self::dependent_count(blueprint, module);
            let risk = Self::classify_risk(kind, dependents);
            per_module.push(ModuleImpact {
                module_id: module.id.clone(),
                change_kind: kind,
                risk,
            });
        }

        let overall = ImpactReport::compute_overall(&per_module);
        let requires_approval = ImpactReport::requires_approval(overall);

        let mut safety_boundary = base_boundary;
        if overall != RiskLevel::Critical {
            safety_boundary.allowed_module_ids.extend(
                per_module
                    .iter()
                    .map(|m| m.module_id.clone())
                    .filter(|id| !safety_boundary.allowed_module_ids.contains(id)),
            );
            for impact in &per_module {
                if let Some(module) = blueprint.find_module(&impact.module_id) {
                    let root = module.effective_root();
                    if !safety_boundary.allowed_paths.contains(&root) {
                        safety_boundary.allowed_paths.push(root);
                    }
                }
            }
        }

        ImpactReport {
            per_module,
            overall_risk_level: overall,
            requires_human_approval: requires_approval,
            safety_boundary,
        }
    }
}

impl Default for ImpactAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies an already-existing codebase into blueprint-shaped modules
/// when the orchestrator is bootstrapped onto a project with no blueprint
/// yet. Pluggable because the heuristics for "what counts as a module
/// boundary" are inherently project-specific; the default implementation
/// uses directory-name heuristics, but a caller may substitute a
/// language-aware implementation.
pub trait ReverseBlueprintClassifier: Send + Sync {
    fn classify(&self, codebase: &crate::capabilities::CodebaseInfo) -> Vec<Module>;
}

/// Groups files by their top-level directory under `src/` (or the project
/// root if there's no `src/`), and reports each group as a module whose
/// name is the directory name.
#[derive(Debug, Default)]
pub struct DirectoryHeuristicClassifier;

impl ReverseBlueprintClassifier for DirectoryHeuristicClassifier {
    fn classify(&self, codebase: &crate::capabilities::CodebaseInfo) -> Vec<Module> {
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for file in &codebase.files {
            let trimmed = file.strip_prefix("src/").unwrap_or(file);
            let top = trimmed
                .split('/')
                .next()
                .unwrap_or(trimmed)
                .to_string();
            if top.is_empty() || top == trimmed {
                continue;
            }
            groups.entry(top).or_default().push(file.clone());
        }

        let mut names: Vec<&String> = groups.keys().collect();
        names.sort();

        names
            .into_iter()
            .map(|name| Module {
                id: crate::ids::ModuleId::from(name.as_str()),
                name: name.clone(),
                description: format!("reverse-engineered from {}", groups[name].len()),
                module_type: crate::model::ModuleType::Other,
                responsibilities: vec![],
                dependencies: vec![],
                interfaces: vec![],
                tech_stack: vec![],
                root_path: Some(format!("src/{name}")),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModuleType;

    fn module(id: &str, deps: &[&str]) -> Module {
        Module {
            id: crate::ids::ModuleId::from(id),
            name: id.into(),
            description: String::new(),
            module_type: ModuleType::Backend,
            responsibilities: vec![],
            dependencies: deps.iter().map(|d| crate::ids::ModuleId::from(*d)).collect(),
            interfaces: vec![],
            tech_stack: vec![],
            root_path: None,
        }
    }

    fn blueprint(modules: Vec<Module>) -> Blueprint {
        Blueprint {
            id: crate::ids::BlueprintId::from("bp-1"),
            name: "demo".into(),
            description: String::new(),
            project_path: "/tmp".into(),
            version: crate::model::Version::INITIAL,
            status: crate::model::BlueprintStatus::Approved,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            approved_by: None,
            rejection_reason: None,
            modules,
            processes: vec![],
            non_functional_requirements: vec![],
            design_images: vec![],
            tech_stack: Default::default(),
        }
    }

    #[test]
    fn intrusive_change_with_many_dependents_is_critical() {
        let bp = blueprint(vec![
            module("auth", &[]),
            module("billing", &["auth"]),
            module("notifications", &["auth"]),
            module("admin", &["billing"]),
        ]);
        let mut signals = HashMap::new();
        signals.insert(
            "auth".to_string(),
            ModuleChangeSignals {
                files_touched: 3,
                touches_public_interface: true,
                ..Default::default()
            },
        );
        let report = ImpactAnalyzer::new().analyze(&bp, &signals, SafetyBoundary::default());
        assert_eq!(report.overall_risk_level, RiskLevel::Critical);
        assert!(report.requires_human_approval);
    }

    #[test]
    fn additive_change_with_no_dependents_is_low_risk() {
        let bp = blueprint(vec![module("reporting", &[])]);
        let mut signals = HashMap::new();
        signals.insert(
            "reporting".to_string(),
            ModuleChangeSignals {
                files_touched: 2,
                ..Default::default()
            },
        );
        let report = ImpactAnalyzer::new().analyze(&bp, &signals, SafetyBoundary::default());
        assert_eq!(report.overall_risk_level, RiskLevel::Low);
        assert!(!report.requires_human_approval);
    }

    #[test]
    fn untouched_modules_are_excluded_from_the_report() {
        let bp = blueprint(vec![module("a", &[]), module("b", &[])]);
        let signals = HashMap::new();
        let report = ImpactAnalyzer::new().analyze(&bp, &signals, SafetyBoundary::default());
        assert!(report.per_module.is_empty());
        assert_eq!(report.overall_risk_level, RiskLevel::Low);
    }

    #[test]
    fn analyze_requirement_scores_exact_name_mention_as_intrusive() {
        let bp = blueprint(vec![
            module("auth", &[]),
            module("billing", &["auth"]),
        ]);
        let report = ImpactAnalyzer::new().analyze_requirement(
            "rework the auth module's token validation",
            &bp,
            SafetyBoundary::default(),
        );
        assert_eq!(report.per_module.len(), 1);
        assert_eq!(report.per_module[0].module_id, crate::ids::ModuleId::from("auth"));
        assert_eq!(report.per_module[0].change_kind, ChangeKind::Intrusive);
        assert_eq!(report.overall_risk_level, RiskLevel::High);
    }

    #[test]
    fn analyze_requirement_ignores_modules_with_no_keyword_hit() {
        let bp = blueprint(vec![module("reporting", &[])]);
        let report = ImpactAnalyzer::new().analyze_requirement(
            "add a button to the marketing site",
            &bp,
            SafetyBoundary::default(),
        );
        assert!(report.per_module.is_empty());
    }

    #[test]
    fn analyze_requirement_matches_on_responsibility_substring() {
        let mut m = module("billing", &[]);
        m.responsibilities = vec!["issue monthly invoices".into()];
        let bp = blueprint(vec![m]);
        let report = ImpactAnalyzer::new().analyze_requirement(
            "customers need to issue monthly invoices themselves",
            &bp,
            SafetyBoundary::default(),
        );
        assert_eq!(report.per_module.len(), 1);
        assert_eq!(report.per_module[0].change_kind, ChangeKind::Additive);
    }

    #[test]
    fn directory_classifier_groups_by_top_level_src_dir() {
        let codebase = crate::capabilities::CodebaseInfo {
            directories: vec![],
            files: vec![
                "src/auth/login.ts".into(),
                "src/auth/logout.ts".into(),
                "src/billing/charge.ts".into(),
            ],
            languages: HashMap::new(),
        };
        let modules = DirectoryHeuristicClassifier.classify(&codebase);
        let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["auth", "billing"]);
    }
}
