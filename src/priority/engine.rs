//! Rule engine for demand ordering.
//!
//! Composes priority rules in weighted or sequential mode. Sorting is
//! stable, so demands with equal scores keep generation order.

use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{rules, PriorityContext, PriorityRule, RuleScore};
use crate::models::ClassDemand;

/// How multiple rules are combined.
#[derive(Debug, Clone, Default)]
pub enum EvaluationMode {
    /// Apply rules in sequence; use next rule only on ties.
    Sequential,
    /// Compute weighted sum of all rule scores.
    #[default]
    Weighted,
}

#[derive(Clone)]
struct WeightedRule {
    rule: Arc<dyn PriorityRule>,
    weight: f64,
}

/// A composable rule engine for demand prioritization.
///
/// # Example
/// ```
/// use u_timetable::priority::{EvaluationMode, PriorityEngine};
/// use u_timetable::priority::rules;
///
/// let engine = PriorityEngine::new()
///     .with_mode(EvaluationMode::Sequential)
///     .with_rule(rules::MultiGroupFirst)
///     .with_rule(rules::StudentCount);
/// ```
#[derive(Clone)]
pub struct PriorityEngine {
    rules: Vec<WeightedRule>,
    mode: EvaluationMode,
    epsilon: f64,
}

impl PriorityEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            mode: EvaluationMode::Weighted,
            epsilon: 1e-9,
        }
    }

    /// The engine the greedy scheduler uses: every built-in rule, weight 1.
    pub fn standard() -> Self {
        Self::new()
            .with_rule(rules::MultiGroupFirst)
            .with_rule(rules::LabFirst)
            .with_rule(rules::ElectiveLast)
            .with_rule(rules::SubgroupBonus)
            .with_rule(rules::StudentCount)
            .with_rule(rules::SoleTeacher)
            .with_rule(rules::PinnedRoom)
    }

    /// Adds a rule (weight 1.0).
    pub fn with_rule<R: PriorityRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(WeightedRule {
            rule: Arc::new(rule),
            weight: 1.0,
        });
        self
    }

    /// Adds a weighted rule.
    pub fn with_weighted_rule<R: PriorityRule + 'static>(mut self, rule: R, weight: f64) -> Self {
        self.rules.push(WeightedRule {
            rule: Arc::new(rule),
            weight,
        });
        self
    }

    /// Sets the evaluation mode.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sorts demands by priority (highest priority first).
    ///
    /// Returns indices into the original slice.
    pub fn sort_indices(&self, demands: &[ClassDemand], context: &PriorityContext<'_>) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..demands.len()).collect();
        match &self.mode {
            EvaluationMode::Sequential => {
                indices.sort_by(|&a, &b| self.compare_sequential(&demands[a], &demands[b], context));
            }
            EvaluationMode::Weighted => {
                let scores: Vec<f64> = demands.iter().map(|d| self.weighted_score(d, context)).collect();
                sort_by_scores(&mut indices, &scores);
            }
        }
        indices
    }

    /// Weighted ordering with each score shifted by uniform noise in
    /// `[0, amplitude)`.
    pub fn sort_indices_jittered<R: Rng + ?Sized>(
        &self,
        demands: &[ClassDemand],
        context: &PriorityContext<'_>,
        rng: &mut R,
        amplitude: f64,
    ) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..demands.len()).collect();
        let scores: Vec<f64> = demands
            .iter()
            .map(|d| {
                let noise = if amplitude > 0.0 {
                    rng.random_range(0.0..amplitude)
                } else {
                    0.0
                };
                self.weighted_score(d, context) + noise
            })
            .collect();
        sort_by_scores(&mut indices, &scores);
        indices
    }

    /// Scores from each rule, weighted.
    pub fn evaluate(&self, demand: &ClassDemand, context: &PriorityContext<'_>) -> Vec<RuleScore> {
        self.rules
            .iter()
            .map(|wr| wr.rule.evaluate(demand, context) * wr.weight)
            .collect()
    }

    fn compare_sequential(&self, a: &ClassDemand, b: &ClassDemand, context: &PriorityContext<'_>) -> Ordering {
        for wr in &self.rules {
            let score_a = wr.rule.evaluate(a, context);
            let score_b = wr.rule.evaluate(b, context);
            if (score_a - score_b).abs() > self.epsilon {
                return score_a.partial_cmp(&score_b).unwrap_or(Ordering::Equal);
            }
        }
        Ordering::Equal
    }

    fn weighted_score(&self, demand: &ClassDemand, context: &PriorityContext<'_>) -> f64 {
        self.rules
            .iter()
            .map(|wr| wr.rule.evaluate(demand, context) * wr.weight)
            .sum()
    }
}

fn sort_by_scores(indices: &mut [usize], scores: &[f64]) {
    indices.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));
}

impl Default for PriorityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PriorityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityEngine")
            .field(
                "rules",
                &self
                    .rules
                    .iter()
                    .map(|r| format!("{}(w={})", r.rule.name(), r.weight))
                    .collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Catalog, CatalogIndex, ClassType, DemandTarget, TeacherSubjectLink};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn demand(uid: &str, class_type: ClassType, students: u32, target: DemandTarget) -> ClassDemand {
        let mut d = ClassDemand::new("math", class_type, "t1", students, target, 0);
        d.uid = uid.into();
        d
    }

    fn group(id: &str) -> DemandTarget {
        DemandTarget::Group { group_id: id.into() }
    }

    fn make_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.teacher_subject_links = vec![
            TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture, ClassType::Lab, ClassType::Elective]),
            TeacherSubjectLink::new("t2", "math", vec![ClassType::Lecture, ClassType::Lab, ClassType::Elective]),
        ];
        c
    }

    #[test]
    fn test_standard_ordering() {
        let c = make_catalog();
        let index = CatalogIndex::new(&c);
        let ctx = PriorityContext::new(&index);
        let demands = vec![
            demand("elective", ClassType::Elective, 20, group("g1")),
            demand("lecture", ClassType::Lecture, 20, group("g1")),
            demand("lab", ClassType::Lab, 20, group("g1")),
            demand(
                "stream",
                ClassType::Lecture,
                40,
                DemandTarget::Groups {
                    group_ids: vec!["g1".into(), "g2".into()],
                    stream_id: None,
                },
            ),
        ];

        let order: Vec<&str> = PriorityEngine::standard()
            .sort_indices(&demands, &ctx)
            .into_iter()
            .map(|i| demands[i].uid.as_str())
            .collect();
        assert_eq!(order, vec!["stream", "lab", "lecture", "elective"]);
    }

    #[test]
    fn test_ties_keep_generation_order() {
        let c = make_catalog();
        let index = CatalogIndex::new(&c);
        let ctx = PriorityContext::new(&index);
        let demands = vec![
            demand("b", ClassType::Lecture, 20, group("g1")),
            demand("a", ClassType::Lecture, 20, group("g2")),
        ];
        assert_eq!(PriorityEngine::standard().sort_indices(&demands, &ctx), vec![0, 1]);
    }

    #[test]
    fn test_sequential_mode() {
        let c = make_catalog();
        let index = CatalogIndex::new(&c);
        let ctx = PriorityContext::new(&index);
        let demands = vec![
            demand("big-lecture", ClassType::Lecture, 90, group("g1")),
            demand("small-lab", ClassType::Lab, 10, group("g2")),
        ];
        let engine = PriorityEngine::new()
            .with_mode(EvaluationMode::Sequential)
            .with_rule(rules::LabFirst)
            .with_rule(rules::StudentCount);
        assert_eq!(engine.sort_indices(&demands, &ctx), vec![1, 0]);

        // Weighted: 90 students outweigh the lab bonus
        let engine = PriorityEngine::new()
            .with_rule(rules::LabFirst)
            .with_rule(rules::StudentCount);
        assert_eq!(engine.sort_indices(&demands, &ctx), vec![0, 1]);
    }

    #[test]
    fn test_jitter_is_seeded() {
        let c = make_catalog();
        let index = CatalogIndex::new(&c);
        let ctx = PriorityContext::new(&index);
        let demands: Vec<ClassDemand> = (0..8)
            .map(|i| demand(&format!("d{i}"), ClassType::Lecture, 20, group("g1")))
            .collect();
        let engine = PriorityEngine::standard();

        let a = engine.sort_indices_jittered(&demands, &ctx, &mut ChaCha8Rng::seed_from_u64(7), 50.0);
        let b = engine.sort_indices_jittered(&demands, &ctx, &mut ChaCha8Rng::seed_from_u64(7), 50.0);
        assert_eq!(a, b);

        let flat = engine.sort_indices_jittered(&demands, &ctx, &mut ChaCha8Rng::seed_from_u64(7), 0.0);
        assert_eq!(flat, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_evaluate_scores() {
        let c = make_catalog();
        let index = CatalogIndex::new(&c);
        let ctx = PriorityContext::new(&index);
        let d = demand("lab", ClassType::Lab, 10, group("g1"));
        let engine = PriorityEngine::new()
            .with_rule(rules::LabFirst)
            .with_weighted_rule(rules::StudentCount, 0.5);
        let scores = engine.evaluate(&d, &ctx);
        assert!((scores[0] + 100.0).abs() < 1e-10);
        assert!((scores[1] + 10.0).abs() < 1e-10);
    }
}
