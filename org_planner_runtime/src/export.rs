//! Budget report export (CSV).
//!
//! Layout:
//!   Category,Description,Personnel Count,Budget Amount
//!   Total row, one row per level, factory rows (only for `All`)
//!   blank line, "Role Breakdown", then one row per role in the view
//!
//! Amounts are whole currency units. Level and total amounts are the
//! average of the min and max salary sums of filled roles.
//!
//! Text cells that a spreadsheet would read as a formula (leading `=`,
//! `+`, `-` or `@`) are prefixed with `'`. Numeric cells are left alone.

use org_planner_core::aggregation::{budget_by_level, factory_breakdown, occupancy_by_role, FactoryFilter};
use org_planner_core::arithmetic::{checked_add, checked_mul};
use org_planner_core::domain::Level;
use org_planner_core::state::PlannerState;

pub const SUMMARY_HEADER: [&str; 4] = ["Category", "Description", "Personnel Count", "Budget Amount"];
pub const ROLE_HEADER: [&str; 5] = ["Role", "Level", "Department", "Personnel Count", "Total Cost"];

/// Render the budget report for `filter`.
pub fn budget_csv(state: &PlannerState, filter: &FactoryFilter) -> String {
    let roles = state.roles.as_slice();
    let personnel = state.personnel.as_slice();
    let report = budget_by_level(roles, personnel, filter);
    let mut out = String::new();

    push_row(&mut out, &SUMMARY_HEADER);

    let (description, headcount) = match filter {
        FactoryFilter::All => ("All Factories".to_string(), personnel.len()),
        FactoryFilter::Foundation => (
            "Foundation Resources".to_string(),
            personnel
                .iter()
                .filter(|p| p.is_assigned() && p.assigned_factory.is_none())
                .count(),
        ),
        FactoryFilter::Factory(id) => (
            state
                .factories
                .get(id)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| id.clone()),
            personnel
                .iter()
                .filter(|p| p.assigned_factory.as_deref() == Some(id.as_str()))
                .count(),
        ),
    };
    push_row(
        &mut out,
        &[
            "Total",
            &description,
            &headcount.to_string(),
            &report.total.avg_cost.to_string(),
        ],
    );

    for level in Level::ALL {
        let b = report.level(level);
        push_row(
            &mut out,
            &[
                "Level",
                level.label(),
                &b.filled.to_string(),
                &b.avg_cost.to_string(),
            ],
        );
    }

    if *filter == FactoryFilter::All {
        for line in factory_breakdown(roles, personnel, state.factories.as_slice()) {
            push_row(
                &mut out,
                &[
                    "Factory",
                    &line.name,
                    &line.headcount.to_string(),
                    &line.budget.to_string(),
                ],
            );
        }
    }

    out.push('\n');
    out.push_str("Role Breakdown\n");
    push_row(&mut out, &ROLE_HEADER);

    let occupancy = occupancy_by_role(personnel);
    for role in roles.iter().filter(|r| filter.includes_role(r)) {
        let count = occupancy.get(role.id.as_str()).copied().unwrap_or(0);
        let total_cost = checked_mul(count, checked_add(role.salary.min, role.salary.max)) / 2;
        let department = if role.factory_specific {
            state
                .factories
                .get(&role.department)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| role.department.clone())
        } else {
            "Foundation".to_string()
        };
        push_row(
            &mut out,
            &[
                &role.title,
                role.level.as_str(),
                &department,
                &count.to_string(),
                &total_cost.to_string(),
            ],
        );
    }

    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

fn should_neutralize(field: &str) -> bool {
    let trimmed = field.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('\'') || trimmed.parse::<i64>().is_ok() {
        return false;
    }
    matches!(trimmed.chars().next(), Some('=' | '+' | '-' | '@'))
}

/// Neutralize formula-like text, then quote a field containing a comma,
/// quote or line break.
pub fn escape_field(field: &str) -> String {
    let safe = if should_neutralize(field) {
        format!("'{}", field)
    } else {
        field.to_string()
    };
    if safe.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", safe.replace('"', "\"\""))
    } else {
        safe
    }
}
