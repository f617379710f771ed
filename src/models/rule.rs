//! User-defined scheduling rules.
//!
//! A rule selects sessions through one or more conditions and constrains
//! them with an action. Strict rules are hard constraints; other
//! severities add a soft penalty when violated.
//!
//! # Selection
//! Single-entity actions combine all conditions left to right with the
//! rule's logical operators (default `AND`). Pairwise actions (`SameDay`,
//! `DifferentDay`, `Order`, `NoOverlap`) treat condition 0 as side A and
//! condition 1 as side B.

use serde::{Deserialize, Serialize};

use super::{ClassType, Day};

/// How hard a rule is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleSeverity {
    #[serde(rename = "Строгое требование (нельзя нарушать)")]
    Strict,
    #[serde(rename = "Сильное предпочтение")]
    Strong,
    #[serde(rename = "Среднее предпочтение")]
    Medium,
    #[serde(rename = "Слабое предпочтение")]
    Weak,
}

/// What a rule demands of the selected sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleAction {
    #[serde(rename = "Избегать времени/дня")]
    AvoidTime,
    #[serde(rename = "Требовать время/день")]
    RequireTime,
    #[serde(rename = "Предпочитать время/день")]
    PreferTime,
    #[serde(rename = "Размещать в один день")]
    SameDay,
    #[serde(rename = "Размещать в разные дни")]
    DifferentDay,
    #[serde(rename = "Размещать пары подряд")]
    Consecutive,
    #[serde(rename = "Максимум пар в день")]
    MaxPerDay,
    #[serde(rename = "Минимум пар в день")]
    MinPerDay,
    #[serde(rename = "Максимум пар подряд")]
    MaxConsecutive,
    #[serde(rename = "Не более N \"окон\" в день")]
    AtMostNGaps,
    #[serde(rename = "Определенный порядок (A перед B)")]
    Order,
    #[serde(rename = "Не пересекать с (по времени)")]
    NoOverlap,
    #[serde(rename = "Начинать не ранее")]
    StartAfter,
    #[serde(rename = "Заканчивать не позднее")]
    EndBefore,
}

impl RuleAction {
    /// Whether the action relates two condition sides (A and B).
    pub fn is_pairwise(self) -> bool {
        matches!(
            self,
            RuleAction::SameDay | RuleAction::DifferentDay | RuleAction::Order | RuleAction::NoOverlap
        )
    }
}

/// Entity kind a condition selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Teacher,
    Group,
    Subject,
    Classroom,
    ClassType,
    Department,
}

/// Joins two adjacent conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Facts about a (candidate or booked) session that conditions test.
#[derive(Debug, Clone, Copy)]
pub struct SessionFacts<'a> {
    pub teacher_id: &'a str,
    pub group_ids: &'a [String],
    pub subgroup_id: Option<&'a str>,
    pub subject_id: &'a str,
    pub room_id: &'a str,
    pub class_type: ClassType,
    /// Departments of the teacher and the groups.
    pub department_ids: &'a [String],
}

/// One selection condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub entity_type: EntityType,
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_type: Option<ClassType>,
}

impl RuleCondition {
    /// Creates a condition over the given entity ids.
    pub fn new(entity_type: EntityType, entity_ids: Vec<String>) -> Self {
        Self {
            entity_type,
            entity_ids,
            class_type: None,
        }
    }

    /// Restricts the condition to one class type.
    pub fn with_class_type(mut self, class_type: ClassType) -> Self {
        self.class_type = Some(class_type);
        self
    }

    fn involves(&self, id: &str, facts: &SessionFacts<'_>) -> bool {
        match self.entity_type {
            EntityType::Teacher => facts.teacher_id == id,
            EntityType::Group => facts.group_ids.iter().any(|g| g == id) || facts.subgroup_id == Some(id),
            EntityType::Subject => facts.subject_id == id,
            EntityType::Classroom => facts.room_id == id,
            EntityType::ClassType => facts.class_type.label() == id,
            EntityType::Department => facts.department_ids.iter().any(|d| d == id),
        }
    }

    fn admits(&self, facts: &SessionFacts<'_>) -> bool {
        self.class_type.map_or(true, |ct| ct == facts.class_type)
    }

    /// Whether a session satisfies this condition.
    pub fn matches(&self, facts: &SessionFacts<'_>) -> bool {
        self.admits(facts) && self.entity_ids.iter().any(|id| self.involves(id, facts))
    }

    /// Listed entities the session involves.
    pub fn matched_ids(&self, facts: &SessionFacts<'_>) -> Vec<&str> {
        if !self.admits(facts) {
            return Vec::new();
        }
        self.entity_ids
            .iter()
            .filter(|id| self.involves(id, facts))
            .map(String::as_str)
            .collect()
    }
}

/// A user-defined scheduling rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub severity: RuleSeverity,
    pub action: RuleAction,
    pub conditions: Vec<RuleCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logical_operators: Vec<LogicalOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<Day>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<u32>,
}

impl Rule {
    /// Creates a rule with one condition.
    pub fn new(id: impl Into<String>, severity: RuleSeverity, action: RuleAction, condition: RuleCondition) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            severity,
            action,
            conditions: vec![condition],
            logical_operators: Vec::new(),
            day: None,
            time_slot_id: None,
            param: None,
        }
    }

    /// Adds a condition joined with `op`.
    pub fn with_condition(mut self, op: LogicalOperator, condition: RuleCondition) -> Self {
        self.logical_operators.push(op);
        self.conditions.push(condition);
        self
    }

    /// Sets the rule's day.
    pub fn on_day(mut self, day: Day) -> Self {
        self.day = Some(day);
        self
    }

    /// Sets the rule's slot.
    pub fn at_slot(mut self, slot_id: impl Into<String>) -> Self {
        self.time_slot_id = Some(slot_id.into());
        self
    }

    /// Sets the numeric parameter.
    pub fn with_param(mut self, param: u32) -> Self {
        self.param = Some(param);
        self
    }

    /// Whether the session is selected by the combined conditions.
    pub fn selects(&self, facts: &SessionFacts<'_>) -> bool {
        let mut conditions = self.conditions.iter();
        let Some(first) = conditions.next() else {
            return false;
        };
        let mut acc = first.matches(facts);
        for (i, cond) in conditions.enumerate() {
            let op = self.logical_operators.get(i).copied().unwrap_or_default();
            acc = match op {
                LogicalOperator::And => acc && cond.matches(facts),
                LogicalOperator::Or => acc || cond.matches(facts),
            };
        }
        acc
    }

    /// Entities of the first condition the session involves.
    ///
    /// Per-day limits (`MaxPerDay`, `MinPerDay`, `Consecutive`,
    /// `MaxConsecutive`, `AtMostNGaps`) apply to each of them separately.
    pub fn limited_entities<'r>(&'r self, facts: &SessionFacts<'_>) -> Vec<&'r str> {
        self.conditions
            .first()
            .map(|c| c.matched_ids(facts))
            .unwrap_or_default()
    }

    /// Pairwise sides: whether the session belongs to side A and side B.
    pub fn sides(&self, facts: &SessionFacts<'_>) -> (bool, bool) {
        let a = self.conditions.first().is_some_and(|c| c.matches(facts));
        let b = self.conditions.get(1).is_some_and(|c| c.matches(facts));
        (a, b)
    }

    /// Whether `(day, slot_id)` matches the rule's day/slot; unset parts match anything.
    pub fn matches_time(&self, day: Day, slot_id: &str) -> bool {
        self.day.map_or(true, |d| d == day)
            && self.time_slot_id.as_deref().map_or(true, |s| s == slot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts<'a>(groups: &'a [String], departments: &'a [String]) -> SessionFacts<'a> {
        SessionFacts {
            teacher_id: "t1",
            group_ids: groups,
            subgroup_id: None,
            subject_id: "math",
            room_id: "r1",
            class_type: ClassType::Lecture,
            department_ids: departments,
        }
    }

    #[test]
    fn test_condition_matching() {
        let groups = vec!["g1".to_string(), "g2".to_string()];
        let deps = vec!["d1".to_string()];
        let f = facts(&groups, &deps);

        assert!(RuleCondition::new(EntityType::Group, vec!["g2".into()]).matches(&f));
        assert!(RuleCondition::new(EntityType::Department, vec!["d1".into()]).matches(&f));
        assert!(RuleCondition::new(EntityType::ClassType, vec!["Лекция".into()]).matches(&f));
        assert!(!RuleCondition::new(EntityType::Teacher, vec!["t2".into()]).matches(&f));
        assert!(!RuleCondition::new(EntityType::Teacher, vec!["t1".into()])
            .with_class_type(ClassType::Lab)
            .matches(&f));
    }

    #[test]
    fn test_limited_entities() {
        let groups = vec!["g1".to_string(), "g2".to_string()];
        let f = facts(&groups, &[]);
        let cond = RuleCondition::new(EntityType::Group, vec!["g2".into(), "g3".into(), "g1".into()]);
        let rule = Rule::new("r", RuleSeverity::Strict, RuleAction::MaxPerDay, cond.clone());
        assert_eq!(rule.limited_entities(&f), vec!["g2", "g1"]);

        let labs_only = Rule::new("r", RuleSeverity::Strict, RuleAction::MaxPerDay, cond.with_class_type(ClassType::Lab));
        assert!(labs_only.limited_entities(&f).is_empty());
    }

    #[test]
    fn test_logical_operators() {
        let groups = vec!["g1".to_string()];
        let f = facts(&groups, &[]);
        let teacher = RuleCondition::new(EntityType::Teacher, vec!["t1".into()]);
        let other_subject = RuleCondition::new(EntityType::Subject, vec!["physics".into()]);

        let and_rule = Rule::new("r", RuleSeverity::Weak, RuleAction::AvoidTime, teacher.clone())
            .with_condition(LogicalOperator::And, other_subject.clone());
        assert!(!and_rule.selects(&f));

        let or_rule = Rule::new("r", RuleSeverity::Weak, RuleAction::AvoidTime, teacher)
            .with_condition(LogicalOperator::Or, other_subject);
        assert!(or_rule.selects(&f));
        assert_eq!(or_rule.sides(&f), (true, false));
    }

    #[test]
    fn test_matches_time() {
        let cond = RuleCondition::new(EntityType::Teacher, vec!["t1".into()]);
        let rule = Rule::new("r", RuleSeverity::Strict, RuleAction::AvoidTime, cond).on_day(Day::Monday);
        assert!(rule.matches_time(Day::Monday, "ts3"));
        assert!(!rule.matches_time(Day::Friday, "ts3"));
        let rule = rule.at_slot("ts1");
        assert!(!rule.matches_time(Day::Monday, "ts3"));
    }

    #[test]
    fn test_rule_wire_format() {
        let json = r#"{
            "id": "r1",
            "description": "no monday mornings",
            "severity": "Строгое требование (нельзя нарушать)",
            "action": "Не более N \"окон\" в день",
            "conditions": [{"entityType": "classType", "entityIds": ["Лабораторная"]}],
            "logicalOperators": ["OR"],
            "day": "Понедельник",
            "param": 1
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.severity, RuleSeverity::Strict);
        assert_eq!(rule.action, RuleAction::AtMostNGaps);
        assert_eq!(rule.conditions[0].entity_type, EntityType::ClassType);
        assert_eq!(rule.logical_operators, vec![LogicalOperator::Or]);
        assert_eq!(rule.day, Some(Day::Monday));
        assert_eq!(rule.param, Some(1));
    }
}
