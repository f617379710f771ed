//! Catalog view passed to priority rules.

use crate::models::{CatalogIndex, ClassDemand, ClassType};

/// Read-only lookups priority rules need.
#[derive(Debug, Clone, Copy)]
pub struct PriorityContext<'a> {
    pub index: &'a CatalogIndex<'a>,
}

impl<'a> PriorityContext<'a> {
    /// Creates a context over an indexed catalog.
    pub fn new(index: &'a CatalogIndex<'a>) -> Self {
        Self { index }
    }

    /// Teachers linked to a subject/class type.
    pub fn link_count(&self, subject_id: &str, class_type: ClassType) -> usize {
        self.index.catalog.link_count(subject_id, class_type)
    }

    /// Pinned rooms of the demand's teacher, subject and groups.
    pub fn pin_count(&self, demand: &ClassDemand) -> usize {
        let teacher = self
            .index
            .teacher(&demand.teacher_id)
            .is_some_and(|t| t.pinned_room_id.is_some());
        let subject = self
            .index
            .subject(&demand.subject_id)
            .is_some_and(|s| s.pinned_room_id.is_some());
        let groups = demand
            .group_ids()
            .iter()
            .filter(|g| self.index.group(g).is_some_and(|g| g.pinned_room_id.is_some()))
            .count();
        usize::from(teacher) + usize::from(subject) + groups
    }
}
