/// Planner Kernel — Core Domain Types
///
/// Pure data plus field validation. No transition logic lives here.
/// Field names serialize in camelCase to match the stored documents;
/// fields the kernel does not model are carried in `extra`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::arithmetic::{checked_add, midpoint};
use crate::errors::{PlannerError, PlannerResult};
use crate::state::{Collection, PlannerState};

// ── Entity kinds ───────────────────────────────────────────────────

/// The document collections the planner persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Role,
    Personnel,
    Factory,
    Phase,
    Scenario,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Role,
        EntityKind::Personnel,
        EntityKind::Factory,
        EntityKind::Phase,
        EntityKind::Scenario,
    ];

    /// Name of the backing document collection.
    pub fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Role => "roles",
            EntityKind::Personnel => "personnel",
            EntityKind::Factory => "factories",
            EntityKind::Phase => "timeline",
            EntityKind::Scenario => "scenarios",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Role => "role",
            EntityKind::Personnel => "personnel",
            EntityKind::Factory => "factory",
            EntityKind::Phase => "phase",
            EntityKind::Scenario => "scenario",
        };
        f.write_str(s)
    }
}

// ── Value types ────────────────────────────────────────────────────

/// Coarse seniority tier used for budget rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Leadership,
    Specialist,
    Associate,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Leadership, Level::Specialist, Level::Associate];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Leadership => "leadership",
            Level::Specialist => "specialist",
            Level::Associate => "associate",
        }
    }

    /// Title-cased label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Level::Leadership => "Leadership",
            Level::Specialist => "Specialist",
            Level::Associate => "Associate",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Salary band in whole currency units. `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: i64,
    pub max: i64,
}

impl SalaryRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> i64 {
        midpoint(self.min, self.max)
    }

    fn validate(&self) -> PlannerResult<()> {
        if self.min < 0 {
            return Err(PlannerError::validation(format!(
                "salary.min must be non-negative, got {}",
                self.min
            )));
        }
        if self.min > self.max {
            return Err(PlannerError::validation(format!(
                "salary.min {} exceeds salary.max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Per-level headcounts (current staffing, recommendations, gaps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LevelCounts {
    pub leadership: i64,
    pub specialist: i64,
    pub associate: i64,
}

impl LevelCounts {
    pub fn new(leadership: i64, specialist: i64, associate: i64) -> Self {
        Self {
            leadership,
            specialist,
            associate,
        }
    }

    pub fn get(&self, level: Level) -> i64 {
        match level {
            Level::Leadership => self.leadership,
            Level::Specialist => self.specialist,
            Level::Associate => self.associate,
        }
    }

    pub fn get_mut(&mut self, level: Level) -> &mut i64 {
        match level {
            Level::Leadership => &mut self.leadership,
            Level::Specialist => &mut self.specialist,
            Level::Associate => &mut self.associate,
        }
    }

    pub fn total(&self) -> i64 {
        checked_add(checked_add(self.leadership, self.specialist), self.associate)
    }
}

/// Assignment state machine of a single personnel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentState {
    Unassigned,
    Assigned(String),
}

// ── Entities ───────────────────────────────────────────────────────

/// A position in the org chart with at most one occupant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub department: String,
    pub level: Level,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub detailed_responsibilities: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub salary: SalaryRange,
    #[serde(default)]
    pub factory_specific: bool,
    /// Capacity denominator for utilization display; not enforced.
    #[serde(default = "default_headcount_target")]
    pub headcount_target: u32,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_headcount_target() -> u32 {
    1
}

impl Role {
    /// Factory a factory-specific role places its occupant at.
    /// The department field carries the factory id for such roles.
    pub fn factory_id(&self) -> Option<&str> {
        if self.factory_specific && !self.department.is_empty() {
            Some(self.department.as_str())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDraft {
    pub title: String,
    #[serde(default)]
    pub department: String,
    pub level: Level,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub detailed_responsibilities: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub salary: SalaryRange,
    #[serde(default)]
    pub factory_specific: bool,
    #[serde(default = "default_headcount_target")]
    pub headcount_target: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoleDraft {
    pub fn new(title: impl Into<String>, level: Level, salary: SalaryRange) -> Self {
        Self {
            title: title.into(),
            department: String::new(),
            level,
            responsibilities: Vec::new(),
            detailed_responsibilities: BTreeMap::new(),
            salary,
            factory_specific: false,
            headcount_target: 1,
            extra: Map::new(),
        }
    }

    /// Mark the role factory-specific to the given factory id.
    pub fn at_factory(mut self, factory_id: impl Into<String>) -> Self {
        self.department = factory_id.into();
        self.factory_specific = true;
        self
    }

    pub fn in_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }
}

/// A person record, optionally occupying one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personnel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub certifications: String,
    #[serde(default)]
    pub assigned_role: Option<String>,
    #[serde(default)]
    pub assigned_factory: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Personnel {
    pub fn assignment_state(&self) -> AssignmentState {
        match &self.assigned_role {
            Some(role_id) => AssignmentState::Assigned(role_id.clone()),
            None => AssignmentState::Unassigned,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_role.is_some()
    }
}

/// Input for a new personnel record. Assignment fields are absent by
/// construction: every record starts unassigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelDraft {
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub certifications: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersonnelDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A physical site with its own factory-specific roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub capacity: i64,
    /// Free text, not a personnel reference.
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub work_order_volume: Option<i64>,
    #[serde(default)]
    pub special_requirements: Vec<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryDraft {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub work_order_volume: Option<i64>,
    #[serde(default)]
    pub special_requirements: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FactoryDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A step of a phase, scoped to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
}

/// A timeline phase with embedded activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Phase {
    /// Activities in display order (by `order`, ties keep stored order).
    pub fn ordered_activities(&self) -> Vec<&Activity> {
        let mut acts: Vec<&Activity> = self.activities.iter().collect();
        acts.sort_by_key(|a| a.order);
        acts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDraft {
    pub title: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub order: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A saved resource-calculator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub factory_id: Option<String>,
    #[serde(default)]
    pub work_order_volume: i64,
    #[serde(default)]
    pub staffing: LevelCounts,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub factory_id: Option<String>,
    #[serde(default)]
    pub work_order_volume: i64,
    #[serde(default)]
    pub staffing: LevelCounts,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Entity trait ───────────────────────────────────────────────────

/// A record stored one-document-per-entity in its kind's collection.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Caller-supplied data for `create`.
    type Draft: Clone + Send + Sync;

    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn from_draft(id: String, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    /// Field-level validation (required fields, ranges).
    fn validate(&self) -> PlannerResult<()>;

    fn touch(&mut self, now: DateTime<Utc>);

    fn collection(state: &PlannerState) -> &Collection<Self>;

    fn collection_mut(state: &mut PlannerState) -> &mut Collection<Self>;
}

pub fn validate_entity_id(kind: EntityKind, id: &str) -> PlannerResult<()> {
    if id.trim().is_empty() {
        return Err(PlannerError::validation(format!("{} id must not be empty", kind)));
    }
    Ok(())
}

fn require_text(kind: EntityKind, field: &str, value: &str) -> PlannerResult<()> {
    if value.trim().is_empty() {
        return Err(PlannerError::validation(format!(
            "{}.{} must not be empty",
            kind, field
        )));
    }
    Ok(())
}

fn require_non_negative(kind: EntityKind, field: &str, value: i64) -> PlannerResult<()> {
    if value < 0 {
        return Err(PlannerError::validation(format!(
            "{}.{} must be non-negative, got {}",
            kind, field, value
        )));
    }
    Ok(())
}

impl Entity for Role {
    type Draft = RoleDraft;
    const KIND: EntityKind = EntityKind::Role;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, d: RoleDraft, now: DateTime<Utc>) -> Self {
        Role {
            id,
            title: d.title,
            department: d.department,
            level: d.level,
            responsibilities: d.responsibilities,
            detailed_responsibilities: d.detailed_responsibilities,
            salary: d.salary,
            factory_specific: d.factory_specific,
            headcount_target: d.headcount_target,
            created_at: now,
            updated_at: now,
            extra: d.extra,
        }
    }

    fn validate(&self) -> PlannerResult<()> {
        validate_entity_id(Self::KIND, &self.id)?;
        require_text(Self::KIND, "title", &self.title)?;
        self.salary.validate()?;
        if self.headcount_target == 0 {
            return Err(PlannerError::validation("role.headcountTarget must be positive"));
        }
        if self.factory_specific && self.department.trim().is_empty() {
            return Err(PlannerError::validation(
                "factory-specific role must name its factory in department",
            ));
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn collection(state: &PlannerState) -> &Collection<Self> {
        &state.roles
    }

    fn collection_mut(state: &mut PlannerState) -> &mut Collection<Self> {
        &mut state.roles
    }
}

impl Entity for Personnel {
    type Draft = PersonnelDraft;
    const KIND: EntityKind = EntityKind::Personnel;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, d: PersonnelDraft, now: DateTime<Utc>) -> Self {
        Personnel {
            id,
            name: d.name,
            position: d.position,
            department: d.department,
            skills: d.skills,
            experience: d.experience,
            education: d.education,
            certifications: d.certifications,
            assigned_role: None,
            assigned_factory: None,
            created_at: now,
            updated_at: now,
            extra: d.extra,
        }
    }

    fn validate(&self) -> PlannerResult<()> {
        validate_entity_id(Self::KIND, &self.id)?;
        require_text(Self::KIND, "name", &self.name)?;
        if self.assigned_factory.is_some() && self.assigned_role.is_none() {
            return Err(PlannerError::validation(format!(
                "personnel {:?} has a factory without a role",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn collection(state: &PlannerState) -> &Collection<Self> {
        &state.personnel
    }

    fn collection_mut(state: &mut PlannerState) -> &mut Collection<Self> {
        &mut state.personnel
    }
}

impl Entity for Factory {
    type Draft = FactoryDraft;
    const KIND: EntityKind = EntityKind::Factory;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, d: FactoryDraft, now: DateTime<Utc>) -> Self {
        Factory {
            id,
            name: d.name,
            location: d.location,
            capacity: d.capacity,
            manager: d.manager,
            clients: d.clients,
            work_order_volume: d.work_order_volume,
            special_requirements: d.special_requirements,
            created_at: now,
            updated_at: now,
            extra: d.extra,
        }
    }

    fn validate(&self) -> PlannerResult<()> {
        validate_entity_id(Self::KIND, &self.id)?;
        require_text(Self::KIND, "name", &self.name)?;
        require_non_negative(Self::KIND, "capacity", self.capacity)?;
        if let Some(volume) = self.work_order_volume {
            require_non_negative(Self::KIND, "workOrderVolume", volume)?;
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn collection(state: &PlannerState) -> &Collection<Self> {
        &state.factories
    }

    fn collection_mut(state: &mut PlannerState) -> &mut Collection<Self> {
        &mut state.factories
    }
}

impl Entity for Phase {
    type Draft = PhaseDraft;
    const KIND: EntityKind = EntityKind::Phase;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, d: PhaseDraft, now: DateTime<Utc>) -> Self {
        Phase {
            id,
            title: d.title,
            timeframe: d.timeframe,
            order: d.order,
            activities: Vec::new(),
            created_at: now,
            updated_at: now,
            extra: d.extra,
        }
    }

    fn validate(&self) -> PlannerResult<()> {
        validate_entity_id(Self::KIND, &self.id)?;
        require_text(Self::KIND, "title", &self.title)?;
        let mut seen = std::collections::BTreeSet::new();
        for act in &self.activities {
            validate_entity_id(Self::KIND, &act.id)?;
            require_text(Self::KIND, "activities.title", &act.title)?;
            if !seen.insert(act.id.as_str()) {
                return Err(PlannerError::validation(format!(
                    "phase {:?} has duplicate activity id {:?}",
                    self.id, act.id
                )));
            }
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn collection(state: &PlannerState) -> &Collection<Self> {
        &state.phases
    }

    fn collection_mut(state: &mut PlannerState) -> &mut Collection<Self> {
        &mut state.phases
    }
}

impl Entity for Scenario {
    type Draft = ScenarioDraft;
    const KIND: EntityKind = EntityKind::Scenario;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, d: ScenarioDraft, now: DateTime<Utc>) -> Self {
        Scenario {
            id,
            name: d.name,
            factory_id: d.factory_id,
            work_order_volume: d.work_order_volume,
            staffing: d.staffing,
            created_at: now,
            updated_at: now,
            extra: d.extra,
        }
    }

    fn validate(&self) -> PlannerResult<()> {
        validate_entity_id(Self::KIND, &self.id)?;
        require_non_negative(Self::KIND, "workOrderVolume", self.work_order_volume)?;
        for level in Level::ALL {
            require_non_negative(Self::KIND, level.as_str(), self.staffing.get(level))?;
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn collection(state: &PlannerState) -> &Collection<Self> {
        &state.scenarios
    }

    fn collection_mut(state: &mut PlannerState) -> &mut Collection<Self> {
        &mut state.scenarios
    }
}
