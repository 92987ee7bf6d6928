/// Opaque handle returned when a task is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Countdown,
    RitualAccrual,
    AuraBroadcast,
    LampRevert { lamp_id: usize },
    DoorReopen { door_id: usize },
}

#[derive(Clone, Debug)]
struct ScheduledTask {
    handle: TaskHandle,
    kind: TaskKind,
    due_ms: u64,
    interval_ms: Option<u64>,
}

/// One-shot and repeating tasks due on a session clock.
///
/// The queue never reads wall time; the owner advances it by asking for due
/// tasks at its own `now_ms`.
#[derive(Clone, Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<ScheduledTask>,
    next_handle: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_once(&mut self, kind: TaskKind, now_ms: u64, delay_ms: u64) -> TaskHandle {
        self.push(kind, now_ms.saturating_add(delay_ms), None)
    }

    pub fn schedule_repeating(
        &mut self,
        kind: TaskKind,
        now_ms: u64,
        interval_ms: u64,
    ) -> TaskHandle {
        let interval_ms = interval_ms.max(1);
        self.push(kind, now_ms.saturating_add(interval_ms), Some(interval_ms))
    }

    fn push(&mut self, kind: TaskKind, due_ms: u64, interval_ms: Option<u64>) -> TaskHandle {
        self.next_handle += 1;
        let handle = TaskHandle(self.next_handle);
        self.tasks.push(ScheduledTask {
            handle,
            kind,
            due_ms,
            interval_ms,
        });
        handle
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.handle != handle);
        self.tasks.len() != before
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|task| task.handle == handle)
    }

    /// Pops the earliest task due at `now_ms`, rescheduling it if repeating.
    ///
    /// Ties resolve in scheduling order. Call in a loop so a handler that
    /// cancels other tasks is respected by the next pop.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TaskHandle, TaskKind)> {
        let idx = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due_ms <= now_ms)
            .min_by_key(|(_, task)| (task.due_ms, task.handle))
            .map(|(idx, _)| idx)?;

        let (handle, kind, interval_ms) = {
            let task = &self.tasks[idx];
            (task.handle, task.kind, task.interval_ms)
        };
        match interval_ms {
            Some(interval) => {
                let task = &mut self.tasks[idx];
                task.due_ms = task.due_ms.saturating_add(interval);
            }
            None => {
                self.tasks.swap_remove(idx);
            }
        }
        Some((handle, kind))
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut TaskQueue, now_ms: u64) -> Vec<TaskKind> {
        let mut out = Vec::new();
        while let Some((_, kind)) = queue.pop_due(now_ms) {
            out.push(kind);
        }
        out
    }

    #[test]
    fn one_shot_fires_once_when_due() {
        let mut queue = TaskQueue::new();
        queue.schedule_once(TaskKind::DoorReopen { door_id: 3 }, 0, 8_000);
        assert!(drain(&mut queue, 7_950).is_empty());
        assert_eq!(
            drain(&mut queue, 8_000),
            vec![TaskKind::DoorReopen { door_id: 3 }]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn repeating_task_fires_every_interval() {
        let mut queue = TaskQueue::new();
        queue.schedule_repeating(TaskKind::Countdown, 0, 1_000);
        assert!(drain(&mut queue, 999).is_empty());
        assert_eq!(drain(&mut queue, 1_000), vec![TaskKind::Countdown]);
        assert_eq!(
            drain(&mut queue, 3_000),
            vec![TaskKind::Countdown, TaskKind::Countdown]
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn due_tasks_pop_in_due_then_schedule_order() {
        let mut queue = TaskQueue::new();
        queue.schedule_once(TaskKind::LampRevert { lamp_id: 1 }, 0, 500);
        queue.schedule_repeating(TaskKind::AuraBroadcast, 0, 500);
        queue.schedule_once(TaskKind::LampRevert { lamp_id: 0 }, 0, 200);
        assert_eq!(
            drain(&mut queue, 500),
            vec![
                TaskKind::LampRevert { lamp_id: 0 },
                TaskKind::LampRevert { lamp_id: 1 },
                TaskKind::AuraBroadcast,
            ]
        );
    }

    #[test]
    fn cancel_and_clear_remove_tasks() {
        let mut queue = TaskQueue::new();
        let accrual = queue.schedule_repeating(TaskKind::RitualAccrual, 0, 1_000);
        queue.schedule_repeating(TaskKind::Countdown, 0, 1_000);
        assert!(queue.cancel(accrual));
        assert!(!queue.cancel(accrual));
        assert!(!queue.is_scheduled(accrual));
        assert_eq!(drain(&mut queue, 1_000), vec![TaskKind::Countdown]);
        queue.clear();
        assert!(drain(&mut queue, 10_000).is_empty());
    }
}
