//! Class demands: atomic units of work produced by the demand pool.
//!
//! A demand asks for exactly one `(date, slot, room)` for one subject,
//! class type and teacher, attended by a single group, one subgroup, or
//! several groups sharing a lecture.

use serde::{Deserialize, Serialize};
use std::slice;

use super::ClassType;

/// Who attends a demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DemandTarget {
    /// A subgroup; its parent group is occupied too.
    Subgroup {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "subgroupId")]
        subgroup_id: String,
    },
    /// Several groups sharing one lecture.
    Groups {
        #[serde(rename = "groupIds")]
        group_ids: Vec<String>,
        /// Set only when every stream member participates.
        #[serde(rename = "streamId", default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
    /// A single whole group.
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
    },
}

impl DemandTarget {
    /// Groups occupied by the demand (parent group for a subgroup).
    pub fn group_ids(&self) -> &[String] {
        match self {
            DemandTarget::Subgroup { group_id, .. } | DemandTarget::Group { group_id } => {
                slice::from_ref(group_id)
            }
            DemandTarget::Groups { group_ids, .. } => group_ids,
        }
    }

    /// Subgroup id, if the target is a subgroup.
    pub fn subgroup_id(&self) -> Option<&str> {
        match self {
            DemandTarget::Subgroup { subgroup_id, .. } => Some(subgroup_id),
            _ => None,
        }
    }

    /// Stream id of a full-stream lecture.
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            DemandTarget::Groups { stream_id, .. } => stream_id.as_deref(),
            _ => None,
        }
    }

    /// Whether the target spans several groups.
    pub fn is_multi_group(&self) -> bool {
        matches!(self, DemandTarget::Groups { .. })
    }

    /// Owner token used in demand uids.
    pub(crate) fn owner_key(&self) -> String {
        match self {
            DemandTarget::Subgroup { subgroup_id, .. } => subgroup_id.clone(),
            DemandTarget::Group { group_id } => group_id.clone(),
            DemandTarget::Groups {
                stream_id: Some(stream_id),
                ..
            } => stream_id.clone(),
            DemandTarget::Groups { group_ids, .. } => group_ids.join("+"),
        }
    }
}

/// One class session that must be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDemand {
    pub uid: String,
    pub subject_id: String,
    pub class_type: ClassType,
    pub teacher_id: String,
    pub student_count: u32,
    #[serde(flatten)]
    pub target: DemandTarget,
}

impl ClassDemand {
    /// Creates a demand with the deterministic uid
    /// `unsched-{subject}-{owner}-{type}-{index}`.
    pub fn new(
        subject_id: impl Into<String>,
        class_type: ClassType,
        teacher_id: impl Into<String>,
        student_count: u32,
        target: DemandTarget,
        index: u32,
    ) -> Self {
        let subject_id = subject_id.into();
        let uid = format!(
            "unsched-{}-{}-{}-{}",
            subject_id,
            target.owner_key(),
            class_type.code(),
            index
        );
        Self {
            uid,
            subject_id,
            class_type,
            teacher_id: teacher_id.into(),
            student_count,
            target,
        }
    }

    /// Groups occupied by the demand.
    #[inline]
    pub fn group_ids(&self) -> &[String] {
        self.target.group_ids()
    }

    /// Subgroup id, if any.
    #[inline]
    pub fn subgroup_id(&self) -> Option<&str> {
        self.target.subgroup_id()
    }
}
