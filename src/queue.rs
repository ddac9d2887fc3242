//! Priority job queue with per-node collapsing.
//!
//! Jobs are kept sorted by priority, highest first. Sorting is stable, so
//! jobs of equal priority keep their arrival order. Enqueuing a node that is
//! already queued raises the existing job's priority instead of adding a
//! second job.

use std::time::Instant;

/// A pending analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub node_id: String,
    /// Higher runs sooner.
    pub priority: i32,
    pub added_at: Instant,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<AnalysisJob>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job, or raise the priority of an existing job for the same node.
    ///
    /// Returns `true` if a new job was added.
    pub fn push(&mut self, node_id: &str, priority: i32) -> bool {
        let added = match self.jobs.iter_mut().find(|j| j.node_id == node_id) {
            Some(existing) => {
                existing.priority = existing.priority.max(priority);
                false
            }
            None => {
                self.jobs.push(AnalysisJob {
                    node_id: node_id.to_string(),
                    priority,
                    added_at: Instant::now(),
                });
                true
            }
        };
        self.jobs.sort_by(|a, b| b.priority.cmp(&a.priority));
        added
    }

    /// Remove and return the highest-priority job.
    pub fn pop(&mut self) -> Option<AnalysisJob> {
        if self.jobs.is_empty() {
            None
        } else {
            Some(self.jobs.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Queued jobs in execution order.
    pub fn snapshot(&self) -> Vec<AnalysisJob> {
        self.jobs.clone()
    }
}
