//! Who may touch which record.
//!
//! `can_access` is a pure predicate over the acting user and a description of
//! the record. Handlers load the record first (so a missing id is a 404) and
//! only then ask this module, turning `false` into a 403.

use std::collections::BTreeSet;

use crate::db::{ClassName, ProgressEntry, Role, Student, TeachingPlan, User};

/// The acting user, reduced to what access decisions need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub assigned_classes: BTreeSet<ClassName>,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn teaches(&self, class: ClassName) -> bool {
        self.assigned_classes.contains(&class)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            assigned_classes: user.assigned_classes.clone(),
        }
    }
}

/// A record (or a record about to be created) an actor wants to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An existing student, identified by its owning teacher
    Student { teacher_id: i64 },
    /// An existing progress entry plus the owner of the student it describes
    Progress { created_by: i64, student_teacher_id: i64 },
    /// An existing teaching plan
    Plan { created_by: i64 },
    /// A new record placed in a class (student or plan creation)
    NewInClass { class: ClassName },
}

impl Target {
    pub fn student(student: &Student) -> Self {
        Target::Student {
            teacher_id: student.teacher_id,
        }
    }

    pub fn progress(entry: &ProgressEntry, student: &Student) -> Self {
        Target::Progress {
            created_by: entry.created_by,
            student_teacher_id: student.teacher_id,
        }
    }

    pub fn plan(plan: &TeachingPlan) -> Self {
        Target::Plan {
            created_by: plan.created_by,
        }
    }
}

/// Admins may touch everything. Teachers may touch their own students, progress
/// they wrote or that describes their students, their own plans, and new
/// records in classes they are assigned.
pub fn can_access(actor: &Actor, target: Target) -> bool {
    if actor.is_admin() {
        return true;
    }

    match target {
        Target::Student { teacher_id } => teacher_id == actor.id,
        Target::Progress {
            created_by,
            student_teacher_id,
        } => created_by == actor.id || student_teacher_id == actor.id,
        Target::Plan { created_by } => created_by == actor.id,
        Target::NewInClass { class } => actor.teaches(class),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher(id: i64, classes: &[ClassName]) -> Actor {
        Actor {
            id,
            role: Role::Teacher,
            assigned_classes: classes.iter().copied().collect(),
        }
    }

    fn admin() -> Actor {
        Actor {
            id: 1,
            role: Role::Admin,
            assigned_classes: BTreeSet::new(),
        }
    }

    #[test]
    fn test_admin_is_always_allowed() {
        let a = admin();
        assert!(can_access(&a, Target::Student { teacher_id: 42 }));
        assert!(can_access(
            &a,
            Target::Progress {
                created_by: 42,
                student_teacher_id: 43
            }
        ));
        assert!(can_access(&a, Target::Plan { created_by: 42 }));
        assert!(can_access(&a, Target::NewInClass { class: ClassName::Ukg }));
    }

    #[test]
    fn test_teacher_owns_students() {
        let t = teacher(5, &[ClassName::Lkg]);
        assert!(can_access(&t, Target::Student { teacher_id: 5 }));
        assert!(!can_access(&t, Target::Student { teacher_id: 6 }));
    }

    #[test]
    fn test_progress_is_visible_to_author_or_student_owner() {
        let t = teacher(5, &[ClassName::Lkg]);
        assert!(can_access(
            &t,
            Target::Progress {
                created_by: 5,
                student_teacher_id: 9
            }
        ));
        assert!(can_access(
            &t,
            Target::Progress {
                created_by: 9,
                student_teacher_id: 5
            }
        ));
        assert!(!can_access(
            &t,
            Target::Progress {
                created_by: 9,
                student_teacher_id: 9
            }
        ));
    }

    #[test]
    fn test_plans_belong_to_creator() {
        let t = teacher(5, &[ClassName::Lkg]);
        assert!(can_access(&t, Target::Plan { created_by: 5 }));
        assert!(!can_access(&t, Target::Plan { created_by: 1 }));
    }

    #[test]
    fn test_new_records_need_an_assigned_class() {
        let t = teacher(5, &[ClassName::Lkg, ClassName::Nursery]);
        assert!(can_access(&t, Target::NewInClass { class: ClassName::Lkg }));
        assert!(!can_access(&t, Target::NewInClass { class: ClassName::Ukg }));

        let unassigned = teacher(6, &[]);
        assert!(!can_access(&unassigned, Target::NewInClass { class: ClassName::Lkg }));
    }
}
