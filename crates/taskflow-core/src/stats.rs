use chrono::NaiveDate;

use crate::task::{Priority, Status, Task};

/// Dashboard counters over the whole task collection (filters do not apply).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    /// High priority and not yet done.
    pub high_priority: usize,
    /// Due strictly before `today` and not yet done.
    pub overdue: usize,
    /// Rounded percentage of done tasks; 0 for an empty collection.
    pub completion_rate: u8,
}

impl Stats {
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Self {
        let mut stats = Stats {
            total: tasks.len(),
            ..Stats::default()
        };

        for task in tasks {
            match task.status {
                Status::Todo => stats.todo += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::Done => stats.done += 1,
            }
            if task.is_done() {
                continue;
            }
            if task.priority == Priority::High {
                stats.high_priority += 1;
            }
            if task.due_date.is_some_and(|due| due < today) {
                stats.overdue += 1;
            }
        }

        if stats.total > 0 {
            let rate = (stats.done as f64 / stats.total as f64 * 100.0).round();
            stats.completion_rate = rate as u8;
        }

        stats
    }
}
