/// Planner Kernel — Aggregation Engine
///
/// Pure, total functions deriving budget, headcount and staffing-gap
/// views from role/personnel snapshots. No mutable state, no failure
/// cases: references that do not resolve simply do not contribute.
///
/// Money: whole currency units (i64). Ratios: fixed-point (SCALE).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::{
    checked_add, checked_mul, checked_sub, midpoint, ratio_scaled, scaled_to_percent,
};
use crate::domain::{Factory, Level, LevelCounts, Personnel, Role, Scenario};

// ---------------------------------------------------------------------------
// Factory filter
// ---------------------------------------------------------------------------

/// Which roles a budget view covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactoryFilter {
    #[default]
    All,
    /// Shared roles that are not tied to a factory.
    Foundation,
    /// Factory-specific roles of one factory.
    Factory(String),
}

impl FactoryFilter {
    pub fn includes_role(&self, role: &Role) -> bool {
        match self {
            FactoryFilter::All => true,
            FactoryFilter::Foundation => !role.factory_specific,
            FactoryFilter::Factory(id) => role.factory_specific && role.department == *id,
        }
    }
}

// ---------------------------------------------------------------------------
// Budget by level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelBudget {
    /// Roles defined at this level.
    pub roles: i64,
    /// Personnel holding a role at this level.
    pub filled: i64,
    pub min_cost: i64,
    pub max_cost: i64,
    pub avg_cost: i64,
}

impl LevelBudget {
    /// filled / roles, fixed-point. Zero roles yields 0.
    pub fn fill_rate(&self) -> i64 {
        ratio_scaled(self.filled, self.roles)
    }

    pub fn fill_percent(&self) -> i64 {
        scaled_to_percent(self.fill_rate())
    }

    fn add_role(&mut self, role: &Role, occupants: i64) {
        self.roles += 1;
        self.filled += occupants;
        self.min_cost = checked_add(self.min_cost, checked_mul(role.salary.min, occupants));
        self.max_cost = checked_add(self.max_cost, checked_mul(role.salary.max, occupants));
    }

    fn finish(&mut self) {
        self.avg_cost = if self.filled > 0 {
            midpoint(self.min_cost, self.max_cost)
        } else {
            0
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BudgetReport {
    pub leadership: LevelBudget,
    pub specialist: LevelBudget,
    pub associate: LevelBudget,
    pub total: LevelBudget,
}

impl BudgetReport {
    pub fn level(&self, level: Level) -> &LevelBudget {
        match level {
            Level::Leadership => &self.leadership,
            Level::Specialist => &self.specialist,
            Level::Associate => &self.associate,
        }
    }

    fn level_mut(&mut self, level: Level) -> &mut LevelBudget {
        match level {
            Level::Leadership => &mut self.leadership,
            Level::Specialist => &mut self.specialist,
            Level::Associate => &mut self.associate,
        }
    }

    /// A level's share of total average cost, fixed-point. Zero total yields 0.
    pub fn cost_share(&self, level: Level) -> i64 {
        ratio_scaled(self.level(level).avg_cost, self.total.avg_cost)
    }
}

/// Number of personnel holding each role id.
pub fn occupancy_by_role(personnel: &[Personnel]) -> BTreeMap<&str, i64> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for p in personnel {
        if let Some(role_id) = p.assigned_role.as_deref() {
            *counts.entry(role_id).or_insert(0) += 1;
        }
    }
    counts
}

/// Filled counts and salary sums per level over the roles the filter covers.
pub fn budget_by_level(
    roles: &[Role],
    personnel: &[Personnel],
    filter: &FactoryFilter,
) -> BudgetReport {
    let occupancy = occupancy_by_role(personnel);
    let mut report = BudgetReport::default();

    for role in roles.iter().filter(|r| filter.includes_role(r)) {
        let occupants = occupancy.get(role.id.as_str()).copied().unwrap_or(0);
        report.level_mut(role.level).add_role(role, occupants);
        report.total.add_role(role, occupants);
    }

    for level in Level::ALL {
        report.level_mut(level).finish();
    }
    report.total.finish();
    report
}

/// Filled headcount per level.
pub fn headcount_by_level(
    roles: &[Role],
    personnel: &[Personnel],
    filter: &FactoryFilter,
) -> LevelCounts {
    let report = budget_by_level(roles, personnel, filter);
    LevelCounts::new(
        report.leadership.filled,
        report.specialist.filled,
        report.associate.filled,
    )
}

// ---------------------------------------------------------------------------
// Role utilization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUtilization {
    pub role_id: String,
    pub occupants: i64,
    pub headcount_target: i64,
    /// occupants / headcount_target, fixed-point.
    pub utilization: i64,
}

pub fn role_utilization(roles: &[Role], personnel: &[Personnel]) -> Vec<RoleUtilization> {
    let occupancy = occupancy_by_role(personnel);
    roles
        .iter()
        .map(|role| {
            let occupants = occupancy.get(role.id.as_str()).copied().unwrap_or(0);
            let target = i64::from(role.headcount_target);
            RoleUtilization {
                role_id: role.id.clone(),
                occupants,
                headcount_target: target,
                utilization: ratio_scaled(occupants, target),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Factory breakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryBudgetLine {
    /// `None` for foundation (not at any factory).
    pub factory_id: Option<String>,
    pub name: String,
    pub headcount: i64,
    /// Sum of salary midpoints of the people placed there.
    pub budget: i64,
}

/// Headcount and midpoint budget of assigned personnel, foundation first,
/// then one line per factory in the given order.
pub fn factory_breakdown(
    roles: &[Role],
    personnel: &[Personnel],
    factories: &[Factory],
) -> Vec<FactoryBudgetLine> {
    let line = |factory_id: Option<&str>, name: &str| {
        let mut headcount = 0;
        let mut budget = 0;
        for p in personnel {
            if p.assigned_factory.as_deref() != factory_id {
                continue;
            }
            let Some(role) = p
                .assigned_role
                .as_deref()
                .and_then(|rid| roles.iter().find(|r| r.id == rid))
            else {
                continue;
            };
            headcount += 1;
            budget = checked_add(budget, role.salary.midpoint());
        }
        FactoryBudgetLine {
            factory_id: factory_id.map(str::to_string),
            name: name.to_string(),
            headcount,
            budget,
        }
    };

    let mut lines = vec![line(None, "Foundation")];
    for factory in factories {
        lines.push(line(Some(factory.id.as_str()), &factory.name));
    }
    lines
}

// ---------------------------------------------------------------------------
// Staffing gap
// ---------------------------------------------------------------------------

/// Sign convention: positive = under-staffed (more needed),
/// negative = over-staffed (surplus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGap {
    pub role_id: String,
    pub level: Level,
    pub calculated: i64,
    pub current: i64,
    pub gap: i64,
    /// gap × role average salary.
    pub cost_impact: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnalysis {
    pub per_role: Vec<RoleGap>,
    pub per_level: LevelCounts,
    pub total: i64,
    /// Σ gap × average salary. Positive means more budget is needed.
    pub cost_impact: i64,
}

/// Per-role and per-level `calculated − current`, over every role named
/// by either map. Role ids that do not resolve are skipped.
pub fn staffing_gap(
    calculated: &BTreeMap<String, i64>,
    current: &BTreeMap<String, i64>,
    roles: &[Role],
) -> GapAnalysis {
    let named: BTreeSet<&str> = calculated
        .keys()
        .chain(current.keys())
        .map(String::as_str)
        .collect();

    let mut analysis = GapAnalysis::default();
    // Σ gap × (min + max); halved once at the end so half units are not lost per role.
    let mut doubled_impact: i64 = 0;

    for role in roles.iter().filter(|r| named.contains(r.id.as_str())) {
        let calc = calculated.get(&role.id).copied().unwrap_or(0);
        let curr = current.get(&role.id).copied().unwrap_or(0);
        let gap = checked_sub(calc, curr);
        let band = checked_add(role.salary.min, role.salary.max);
        let doubled = checked_mul(gap, band);

        let level_total = analysis.per_level.get_mut(role.level);
        *level_total = checked_add(*level_total, gap);
        analysis.total = checked_add(analysis.total, gap);
        doubled_impact = checked_add(doubled_impact, doubled);

        analysis.per_role.push(RoleGap {
            role_id: role.id.clone(),
            level: role.level,
            calculated: calc,
            current: curr,
            gap,
            cost_impact: doubled / 2,
        });
    }

    analysis.cost_impact = doubled_impact / 2;
    analysis
}

/// Current headcount per role id, from live assignments.
pub fn current_staffing(personnel: &[Personnel]) -> BTreeMap<String, i64> {
    occupancy_by_role(personnel)
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// `recommended − current` per level (the resource calculator's gap).
pub fn level_gap(recommended: &LevelCounts, current: &LevelCounts) -> LevelCounts {
    LevelCounts::new(
        checked_sub(recommended.leadership, current.leadership),
        checked_sub(recommended.specialist, current.specialist),
        checked_sub(recommended.associate, current.associate),
    )
}

// ---------------------------------------------------------------------------
// Recommended staffing
// ---------------------------------------------------------------------------

/// Business rule mapping monthly work-order volume to headcount.
pub trait StaffingStrategy {
    fn recommend(&self, work_order_volume: i64) -> LevelCounts;
}

/// Placeholder rule: leadership = max(1, ⌊v/1000⌋), specialist =
/// max(2, ⌊v/500⌋), associate = max(3, ⌊v/200⌋).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStaffingStrategy;

impl StaffingStrategy for DefaultStaffingStrategy {
    fn recommend(&self, v: i64) -> LevelCounts {
        LevelCounts::new(
            v.div_euclid(1000).max(1),
            v.div_euclid(500).max(2),
            v.div_euclid(200).max(3),
        )
    }
}

pub fn recommended_staffing(work_order_volume: i64) -> LevelCounts {
    DefaultStaffingStrategy.recommend(work_order_volume)
}

// ---------------------------------------------------------------------------
// Scenario comparison
// ---------------------------------------------------------------------------

/// Most scenarios that can be compared side by side.
pub const MAX_COMPARED_SCENARIOS: usize = 3;

/// Ordered selection of scenario ids, capped at `MAX_COMPARED_SCENARIOS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioSelection {
    ids: Vec<String>,
}

impl ScenarioSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deselect if selected, otherwise select when below the cap.
    /// Returns whether the id is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|s| s == id) {
            self.ids.remove(pos);
            return false;
        }
        if self.ids.len() < MAX_COMPARED_SCENARIOS {
            self.ids.push(id.to_string());
            return true;
        }
        false
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRow {
    pub scenario_id: String,
    pub name: String,
    pub work_order_volume: i64,
    pub staffing: LevelCounts,
    pub recommended: LevelCounts,
    pub gap: LevelCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub rows: Vec<ScenarioRow>,
    /// Per-level maxima across the rows, for chart scaling.
    pub max: LevelCounts,
    pub max_total: i64,
}

/// Rows for the selected scenarios, in the order scenarios are listed.
pub fn compare_scenarios(
    scenarios: &[Scenario],
    selection: &ScenarioSelection,
    strategy: &dyn StaffingStrategy,
) -> ScenarioComparison {
    let mut comparison = ScenarioComparison::default();
    for s in scenarios.iter().filter(|s| selection.contains(&s.id)) {
        let recommended = strategy.recommend(s.work_order_volume);
        for level in Level::ALL {
            let slot = comparison.max.get_mut(level);
            *slot = (*slot).max(s.staffing.get(level));
        }
        comparison.max_total = comparison.max_total.max(s.staffing.total());
        comparison.rows.push(ScenarioRow {
            scenario_id: s.id.clone(),
            name: s.name.clone(),
            work_order_volume: s.work_order_volume,
            staffing: s.staffing,
            recommended,
            gap: level_gap(&recommended, &s.staffing),
        });
    }
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, FactoryDraft, PersonnelDraft, RoleDraft, SalaryRange, ScenarioDraft};
    use chrono::Utc;

    fn role(id: &str, level: Level, min: i64, max: i64) -> Role {
        Role::from_draft(id.into(), RoleDraft::new(id, level, SalaryRange::new(min, max)), Utc::now())
    }

    fn person(id: &str, role: Option<&str>, factory: Option<&str>) -> Personnel {
        let mut p = Personnel::from_draft(id.into(), PersonnelDraft::named(id), Utc::now());
        p.assigned_role = role.map(str::to_string);
        p.assigned_factory = factory.map(str::to_string);
        p
    }

    #[test]
    fn test_budget_empty_personnel_is_all_zero() {
        let roles = vec![role("r1", Level::Leadership, 80_000, 120_000)];
        let report = budget_by_level(&roles, &[], &FactoryFilter::All);
        for level in Level::ALL {
            let b = report.level(level);
            assert_eq!((b.filled, b.min_cost, b.max_cost, b.avg_cost), (0, 0, 0, 0));
            assert_eq!(report.cost_share(level), 0);
        }
        assert_eq!(report.leadership.roles, 1);
        assert_eq!(report.leadership.fill_percent(), 0);
        assert_eq!(report.specialist.fill_rate(), 0);
    }

    #[test]
    fn test_budget_single_leadership_role() {
        let roles = vec![role("r1", Level::Leadership, 80_000, 120_000)];
        let personnel = vec![person("p1", Some("r1"), None)];
        let report = budget_by_level(&roles, &personnel, &FactoryFilter::All);
        assert_eq!(report.leadership.filled, 1);
        assert_eq!(report.leadership.min_cost, 80_000);
        assert_eq!(report.leadership.max_cost, 120_000);
        assert_eq!(report.leadership.avg_cost, 100_000);
        assert_eq!(report.leadership.fill_percent(), 100);
        assert_eq!(report.total.avg_cost, 100_000);
        assert_eq!(report.cost_share(Level::Leadership), 10_000);
    }

    #[test]
    fn test_budget_ignores_dangling_references() {
        let roles = vec![role("r1", Level::Specialist, 50_000, 70_000)];
        let personnel = vec![person("p1", Some("deleted"), None)];
        let report = budget_by_level(&roles, &personnel, &FactoryFilter::All);
        assert_eq!(report.total.filled, 0);
    }

    #[test]
    fn test_budget_factory_filter() {
        let now = Utc::now();
        let plant = Role::from_draft(
            "plant".into(),
            RoleDraft::new("Plant QM", Level::Leadership, SalaryRange::new(10, 20)).at_factory("f1"),
            now,
        );
        let shared = role("shared", Level::Leadership, 100, 200);
        let roles = vec![plant, shared];
        let personnel = vec![
            person("p1", Some("plant"), Some("f1")),
            person("p2", Some("shared"), None),
        ];

        let f1 = budget_by_level(&roles, &personnel, &FactoryFilter::Factory("f1".into()));
        assert_eq!((f1.total.roles, f1.total.filled, f1.total.min_cost), (1, 1, 10));

        let foundation = budget_by_level(&roles, &personnel, &FactoryFilter::Foundation);
        assert_eq!((foundation.total.roles, foundation.total.max_cost), (1, 200));

        let counts = headcount_by_level(&roles, &personnel, &FactoryFilter::All);
        assert_eq!(counts, LevelCounts::new(2, 0, 0));
    }

    #[test]
    fn test_role_utilization_uses_target() {
        let mut r = role("r1", Level::Associate, 1, 1);
        r.headcount_target = 4;
        let util = role_utilization(&[r], &[person("p1", Some("r1"), None)]);
        assert_eq!(util[0].occupants, 1);
        assert_eq!(util[0].utilization, 2_500);
    }

    #[test]
    fn test_factory_breakdown_lines() {
        let now = Utc::now();
        let roles = vec![
            Role::from_draft(
                "plant".into(),
                RoleDraft::new("Plant QM", Level::Leadership, SalaryRange::new(10, 20)).at_factory("f1"),
                now,
            ),
            role("shared", Level::Leadership, 100, 200),
        ];
        let factories = vec![Factory::from_draft("f1".into(), FactoryDraft::named("Boston"), now)];
        let personnel = vec![
            person("p1", Some("plant"), Some("f1")),
            person("p2", Some("shared"), None),
            person("p3", None, None),
        ];
        let lines = factory_breakdown(&roles, &personnel, &factories);
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].name.as_str(), lines[0].headcount, lines[0].budget), ("Foundation", 1, 150));
        assert_eq!((lines[1].headcount, lines[1].budget), (1, 15));
    }

    #[test]
    fn test_staffing_gap_sign_and_cost() {
        let roles = vec![
            role("lead", Level::Leadership, 100, 200),
            role("tech", Level::Associate, 40, 61),
        ];
        let calculated: BTreeMap<String, i64> =
            [("lead".to_string(), 2), ("tech".to_string(), 1)].into_iter().collect();
        let current: BTreeMap<String, i64> =
            [("lead".to_string(), 1), ("tech".to_string(), 2), ("ghost".to_string(), 9)]
                .into_iter()
                .collect();
        let gap = staffing_gap(&calculated, &current, &roles);

        assert_eq!(gap.per_level.leadership, 1);
        assert_eq!(gap.per_level.associate, -1);
        assert_eq!(gap.total, 0);
        // +1 × 150 + (−1) × 50.5 = 99.5 → 99
        assert_eq!(gap.cost_impact, 99);
        assert_eq!(gap.per_role.len(), 2);
        assert_eq!(gap.per_role[0].cost_impact, 150);
    }

    #[test]
    fn test_current_staffing_counts_assignments() {
        let personnel = vec![person("p1", Some("r1"), None), person("p2", None, None)];
        let current = current_staffing(&personnel);
        assert_eq!(current.get("r1"), Some(&1));
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn test_recommended_staffing_default_rule() {
        let plan = recommended_staffing(400);
        assert_eq!(plan, LevelCounts::new(1, 2, 3));
        assert_eq!(plan.total(), 6);

        let big = recommended_staffing(5_000);
        assert_eq!(big, LevelCounts::new(5, 10, 25));
        assert_eq!(recommended_staffing(0).total(), 6);
    }

    #[test]
    fn test_staffing_strategy_is_pluggable() {
        struct Flat;
        impl StaffingStrategy for Flat {
            fn recommend(&self, _v: i64) -> LevelCounts {
                LevelCounts::new(1, 1, 1)
            }
        }
        let scenarios = vec![Scenario::from_draft(
            "s1".into(),
            ScenarioDraft {
                work_order_volume: 9_000,
                staffing: LevelCounts::new(0, 2, 5),
                ..Default::default()
            },
            Utc::now(),
        )];
        let mut selection = ScenarioSelection::new();
        selection.toggle("s1");
        let cmp = compare_scenarios(&scenarios, &selection, &Flat);
        assert_eq!(cmp.rows[0].gap, LevelCounts::new(1, -1, -4));
    }

    #[test]
    fn test_level_gap() {
        let gap = level_gap(&LevelCounts::new(1, 2, 3), &LevelCounts::new(2, 2, 0));
        assert_eq!(gap, LevelCounts::new(-1, 0, 3));
        assert_eq!(gap.total(), 2);
    }

    #[test]
    fn test_gaps_saturate_on_extreme_counts() {
        let gap = level_gap(
            &LevelCounts::new(i64::MAX, i64::MIN, 0),
            &LevelCounts::new(-1, 1, i64::MIN),
        );
        assert_eq!(gap, LevelCounts::new(i64::MAX, i64::MIN, i64::MAX));
        assert_eq!(LevelCounts::new(i64::MAX, i64::MAX, 1).total(), i64::MAX);

        let roles = vec![
            role("a", Level::Specialist, 1, 1),
            role("b", Level::Specialist, 1, 1),
        ];
        let calculated: BTreeMap<String, i64> =
            [("a".to_string(), i64::MAX), ("b".to_string(), i64::MAX)].into_iter().collect();
        let current: BTreeMap<String, i64> = [("a".to_string(), -1)].into_iter().collect();
        let gap = staffing_gap(&calculated, &current, &roles);
        assert_eq!(gap.per_role[0].gap, i64::MAX);
        assert_eq!(gap.per_level.specialist, i64::MAX);
        assert_eq!(gap.total, i64::MAX);
    }

    #[test]
    fn test_scenario_selection_caps_at_three() {
        let mut sel = ScenarioSelection::new();
        for id in ["a", "b", "c"] {
            assert!(sel.toggle(id));
        }
        assert!(!sel.toggle("d"));
        assert!(!sel.toggle("b"));
        assert!(sel.toggle("d"));
        assert_eq!(sel.ids(), &["a".to_string(), "c".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_compare_scenarios_maxima() {
        let now = Utc::now();
        let mk = |id: &str, counts: LevelCounts| {
            Scenario::from_draft(
                id.into(),
                ScenarioDraft {
                    name: id.into(),
                    work_order_volume: 1_000,
                    staffing: counts,
                    ..Default::default()
                },
                now,
            )
        };
        let scenarios = vec![
            mk("a", LevelCounts::new(1, 5, 2)),
            mk("b", LevelCounts::new(3, 1, 2)),
            mk("c", LevelCounts::new(0, 0, 0)),
        ];
        let mut sel = ScenarioSelection::new();
        sel.toggle("b");
        sel.toggle("a");
        let cmp = compare_scenarios(&scenarios, &sel, &DefaultStaffingStrategy);
        let ids: Vec<&str> = cmp.rows.iter().map(|r| r.scenario_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(cmp.max, LevelCounts::new(3, 5, 2));
        assert_eq!(cmp.max_total, 8);
        assert_eq!(cmp.rows[0].recommended, LevelCounts::new(1, 2, 5));
    }
}
