//! The live-queue set and the driver surface.
//!
//! [`Scheduler`] owns every running [`Queue`] and advances them in creation
//! order, one round per tick:
//!
//! ```rust,ignore
//! # use tagscript::script::scheduler::Scheduler;
//! let mut sched = Scheduler::new(engine);
//! let id = sched.create_queue_named("main")?;
//! while sched.has_live() {
//!     interval.tick().await;
//!     sched.advance_all(dt);
//!     for line in sched.take_output(id) { println!("{line}"); }
//! }
//! ```
//!
//! Completed queues leave the live set during the round that completes
//! them and are retired so their output and variables stay readable.
//! Retired queues are kept until the caller takes them back with
//! [`Scheduler::release`] or drops them all with
//! [`Scheduler::clear_retired`]; a long-running driver must do one or the
//! other after draining output.
//! Queues spawned by `run` join the live set at the end of the round.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use super::engine::{Engine, Script};
use super::queue::Queue;

/// Identifies a queue for the lifetime of its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Scheduler {
    engine: Rc<Engine>,
    live: Vec<(QueueId, Queue)>,
    retired: HashMap<QueueId, Queue>,
    next_id: u64,
}

impl Scheduler {
    pub fn new(engine: Rc<Engine>) -> Self {
        Self { engine, live: Vec::new(), retired: HashMap::new(), next_id: 1 }
    }

    pub fn engine(&self) -> &Rc<Engine> {
        &self.engine
    }

    /// Start a queue running `script`.
    pub fn create_queue(&mut self, script: Rc<Script>) -> QueueId {
        let queue = Queue::new(&self.engine, script);
        self.adopt(queue)
    }

    /// Start a queue running the registered script `name`.
    pub fn create_queue_named(&mut self, name: &str) -> Option<QueueId> {
        let script = self.engine.script(name)?;
        Some(self.create_queue(script))
    }

    fn adopt(&mut self, mut queue: Queue) -> QueueId {
        let id = QueueId(self.next_id);
        self.next_id += 1;
        queue.start();
        debug!("queue {id} created for '{}'", queue.name());
        self.live.push((id, queue));
        id
    }

    /// Advance one queue.  Returns `false` if it is not live.
    pub fn advance(&mut self, id: QueueId, dt: f64) -> bool {
        let Some(pos) = self.live.iter().position(|(qid, _)| *qid == id) else {
            return false;
        };
        self.live[pos].1.advance(&self.engine, dt);
        if self.live[pos].1.is_completed() {
            self.retire(pos);
        }
        self.adopt_spawned();
        true
    }

    /// Advance every live queue once, in creation order.
    pub fn advance_all(&mut self, dt: f64) {
        let mut i = 0;
        while i < self.live.len() {
            self.live[i].1.advance(&self.engine, dt);
            if self.live[i].1.is_completed() {
                self.retire(i);
            } else {
                i += 1;
            }
        }
        self.adopt_spawned();
    }

    fn retire(&mut self, pos: usize) {
        let (id, queue) = self.live.remove(pos);
        debug!("queue {id} retired");
        self.retired.insert(id, queue);
    }

    fn adopt_spawned(&mut self) {
        for queue in self.engine.take_spawned() {
            self.adopt(queue);
        }
    }

    /// Hard-stop a queue.  Returns `false` if it is not live.
    pub fn stop(&mut self, id: QueueId) -> bool {
        let Some(pos) = self.live.iter().position(|(qid, _)| *qid == id) else {
            return false;
        };
        self.live[pos].1.stop();
        self.retire(pos);
        true
    }

    /// Stop every live queue.
    pub fn stop_all(&mut self) {
        while !self.live.is_empty() {
            self.live[0].1.stop();
            self.retire(0);
        }
    }

    /// Subscribe to a queue's completion.  Returns `false` for unknown ids.
    pub fn on_complete(&mut self, id: QueueId, callback: impl FnOnce(&Queue) + 'static) -> bool {
        match self.queue_mut(id) {
            Some(queue) => {
                queue.on_complete(callback);
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, id: QueueId) -> bool {
        self.live.iter().any(|(qid, _)| *qid == id)
    }

    pub fn has_live(&self) -> bool {
        !self.live.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Ids of live queues, in advance order.
    pub fn live_ids(&self) -> impl Iterator<Item = QueueId> + '_ {
        self.live.iter().map(|(id, _)| *id)
    }

    /// A live or retired queue.
    pub fn queue(&self, id: QueueId) -> Option<&Queue> {
        self.live
            .iter()
            .find(|(qid, _)| *qid == id)
            .map(|(_, q)| q)
            .or_else(|| self.retired.get(&id))
    }

    fn queue_mut(&mut self, id: QueueId) -> Option<&mut Queue> {
        match self.live.iter_mut().find(|(qid, _)| *qid == id) {
            Some((_, q)) => Some(q),
            None => self.retired.get_mut(&id),
        }
    }

    /// Drain a queue's output lines.
    pub fn take_output(&mut self, id: QueueId) -> Vec<String> {
        self.queue_mut(id).map(Queue::take_output).unwrap_or_default()
    }

    /// Drain output from every queue, live and retired, tagged with its id
    /// and ordered by id.
    pub fn drain_all_output(&mut self) -> Vec<(QueueId, String)> {
        let mut ids: Vec<QueueId> = self.live_ids().chain(self.retired.keys().copied()).collect();
        ids.sort();
        let mut out = Vec::new();
        for id in ids {
            out.extend(self.take_output(id).into_iter().map(|line| (id, line)));
        }
        out
    }

    /// Take a retired queue out of the scheduler.  `None` while the queue
    /// is still live or once it has been released.
    pub fn release(&mut self, id: QueueId) -> Option<Queue> {
        self.retired.remove(&id)
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Drop retired queues.
    pub fn clear_retired(&mut self) {
        self.retired.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::cell::Cell;

    fn sched(scripts: &[(&str, &str)]) -> Scheduler {
        let engine = Engine::new(EngineConfig::default());
        for (name, src) in scripts {
            engine.load(name, src).unwrap();
        }
        Scheduler::new(Rc::new(engine))
    }

    #[test]
    fn create_and_complete() {
        let mut s = sched(&[("a", "echo hi")]);
        let id = s.create_queue_named("a").unwrap();
        assert!(s.is_live(id));
        s.advance_all(0.05);
        assert!(!s.is_live(id));
        assert!(s.queue(id).unwrap().is_completed());
        assert_eq!(s.take_output(id), ["hi"]);
    }

    #[test]
    fn retired_queues_are_kept_until_released() {
        let mut s = sched(&[("a", "define x 1\necho hi"), ("w", "wait 1")]);
        let a = s.create_queue_named("a").unwrap();
        let b = s.create_queue_named("a").unwrap();
        let w = s.create_queue_named("w").unwrap();
        s.advance_all(0.1);
        assert_eq!(s.retired_count(), 2);
        assert!(s.release(w).is_none());

        let queue = s.release(a).expect("retired queue");
        assert_eq!(queue.output(), ["hi"]);
        assert!(s.queue(a).is_none());
        assert!(s.release(a).is_none());
        assert_eq!(s.retired_count(), 1);

        s.clear_retired();
        assert!(s.queue(b).is_none());
        assert!(s.queue(w).is_some());
    }

    #[test]
    fn unknown_script_name() {
        let mut s = sched(&[]);
        assert!(s.create_queue_named("nope").is_none());
    }

    #[test]
    fn removal_does_not_skip_neighbours() {
        let mut s = sched(&[("quick", "echo q"), ("slow", "wait 1\necho s")]);
        let a = s.create_queue_named("quick").unwrap();
        let b = s.create_queue_named("quick").unwrap();
        let c = s.create_queue_named("slow").unwrap();
        let d = s.create_queue_named("quick").unwrap();
        s.advance_all(0.1);
        for id in [a, b, d] {
            assert_eq!(s.take_output(id), ["q"], "queue {id}");
        }
        assert!(s.is_live(c));
        assert_eq!(s.live_count(), 1);
    }

    #[test]
    fn stop_completes_queue() {
        let mut s = sched(&[("w", "wait 10\necho never")]);
        let id = s.create_queue_named("w").unwrap();
        s.advance_all(0.1);
        let stopped = Rc::new(Cell::new(false));
        let flag = Rc::clone(&stopped);
        s.on_complete(id, move |_| flag.set(true));
        assert!(s.stop(id));
        assert!(stopped.get());
        assert!(!s.stop(id));
        assert!(s.take_output(id).is_empty());
    }

    #[test]
    fn run_spawns_next_round() {
        let mut s = sched(&[("parent", "run child\necho parent"), ("child", "echo child")]);
        let p = s.create_queue_named("parent").unwrap();
        s.advance_all(0.1);
        assert_eq!(s.take_output(p), ["parent"]);
        assert_eq!(s.live_count(), 1);
        s.advance_all(0.1);
        let out = s.drain_all_output();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, "child");
        assert!(!s.has_live());
    }

    #[test]
    fn waited_run_blocks_parent() {
        let mut s = sched(&[
            ("parent", "&run child\necho parent done"),
            ("child", "echo child start\nwait 0.15\necho child done"),
        ]);
        s.create_queue_named("parent").unwrap();
        let mut lines = Vec::new();
        let mut rounds = 0;
        while s.has_live() && rounds < 20 {
            s.advance_all(0.1);
            lines.extend(s.drain_all_output().into_iter().map(|(_, l)| l));
            rounds += 1;
        }
        assert_eq!(lines, ["child start", "child done", "parent done"]);
        assert_eq!(rounds, 5);
    }
}
