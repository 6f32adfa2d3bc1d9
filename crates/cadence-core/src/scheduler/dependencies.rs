//! Dependency resolution
//!
//! A dependency that no longer exists in the table is never satisfied.

use std::collections::BTreeMap;

use super::types::{DependencyBehavior, Task, TaskId};

/// Decide whether the dependencies of `task` allow it to run
pub fn dependencies_satisfied(task: &Task, tasks: &BTreeMap<TaskId, Task>) -> bool {
    if task.dependencies.is_empty() {
        return true;
    }

    let qualifies = |dep: &Task| match task.dep_behavior {
        DependencyBehavior::AnySuccess | DependencyBehavior::AllSuccess => dep.succeeded(),
        DependencyBehavior::AnyCompletion | DependencyBehavior::AllCompletion => dep.has_run(),
    };

    match task.dep_behavior {
        DependencyBehavior::AnySuccess | DependencyBehavior::AnyCompletion => {
            for id in &task.dependencies {
                match tasks.get(id) {
                    Some(dep) if qualifies(dep) => return true,
                    Some(_) => {}
                    None => return false,
                }
            }
            false
        }
        DependencyBehavior::AllSuccess | DependencyBehavior::AllCompletion => task
            .dependencies
            .iter()
            .all(|id| tasks.get(id).is_some_and(qualifies)),
    }
}
