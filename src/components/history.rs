use crate::canvas::{BufferKey, BufferSnapshot};
use crate::error::DocResult;
use crate::sprite::BufferArena;

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// A reversible edit to an image's buffers.
pub trait Command: Send + Sync {
    fn undo(&self, buffers: &mut BufferArena) -> DocResult<()>;
    fn redo(&self, buffers: &mut BufferArena) -> DocResult<()>;
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// AREA CHANGE - full before/after snapshot of one (layer, frame) buffer
// ============================================================================

pub struct AreaChange {
    key: BufferKey,
    before: BufferSnapshot,
    after: BufferSnapshot,
    label: String,
}

impl AreaChange {
    pub fn new(
        key: BufferKey,
        before: BufferSnapshot,
        after: BufferSnapshot,
        label: impl Into<String>,
    ) -> Self {
        Self {
            key,
            before,
            after,
            label: label.into(),
        }
    }

    pub fn key(&self) -> &BufferKey {
        &self.key
    }

    pub fn before(&self) -> &BufferSnapshot {
        &self.before
    }

    pub fn after(&self) -> &BufferSnapshot {
        &self.after
    }

    /// True when the edit did not change a single pixel.
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

// A buffer only disappears with its layer or frame, so a missing key is a
// removed target and the record has nothing left to restore.
impl Command for AreaChange {
    fn undo(&self, buffers: &mut BufferArena) -> DocResult<()> {
        match buffers.get_mut(&self.key) {
            Some(buffer) => buffer.restore(&self.before),
            None => Ok(()),
        }
    }

    fn redo(&self, buffers: &mut BufferArena) -> DocResult<()> {
        match buffers.get_mut(&self.key) {
            Some(buffer) => buffer.restore(&self.after),
            None => Ok(()),
        }
    }

    fn description(&self) -> String {
        self.label.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_size() + self.after.memory_size()
    }
}

// ============================================================================
// COMPOSITE CHANGE - several buffers changed by one gesture
// ============================================================================

pub struct CompositeChange {
    parts: Vec<AreaChange>,
    label: String,
}

impl CompositeChange {
    pub fn new(parts: Vec<AreaChange>, label: impl Into<String>) -> Self {
        Self {
            parts,
            label: label.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Command for CompositeChange {
    fn undo(&self, buffers: &mut BufferArena) -> DocResult<()> {
        for part in self.parts.iter().rev() {
            part.undo(buffers)?;
        }
        Ok(())
    }

    fn redo(&self, buffers: &mut BufferArena) -> DocResult<()> {
        for part in &self.parts {
            part.redo(buffers)?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.label.clone()
    }

    fn memory_size(&self) -> usize {
        self.parts.iter().map(|p| p.memory_size()).sum()
    }
}

// ============================================================================
// HISTORY MANAGER - linear undo/redo timeline
// ============================================================================

/// Linear undo/redo timeline.
///
/// Records `[0, applied)` are applied; the rest are redoable. `position()` is
/// the index of the last applied record, `-1` when nothing is applied.
/// Records are only ever discarded by [`push`](Self::push) after an undo, or
/// by [`clear`](Self::clear).
#[derive(Default)]
pub struct HistoryManager {
    records: Vec<Box<dyn Command>>,
    applied: usize,
    /// Running memory total across all records.
    total_memory: usize,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the redoable tail, then append `command` as the newest applied record.
    pub fn push(&mut self, command: Box<dyn Command>) {
        for cmd in self.records.drain(self.applied..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }
        self.total_memory += command.memory_size();
        self.records.push(command);
        self.applied = self.records.len();
    }

    /// Revert the last applied record. `Ok(None)` when there is nothing to undo.
    ///
    /// If the record fails to apply the position is left unchanged.
    pub fn undo(&mut self, buffers: &mut BufferArena) -> DocResult<Option<String>> {
        if self.applied == 0 {
            return Ok(None);
        }
        let command = &self.records[self.applied - 1];
        command.undo(buffers)?;
        self.applied -= 1;
        Ok(Some(command.description()))
    }

    /// Re-apply the next record. `Ok(None)` when there is nothing to redo.
    pub fn redo(&mut self, buffers: &mut BufferArena) -> DocResult<Option<String>> {
        let Some(command) = self.records.get(self.applied) else {
            return Ok(None);
        };
        command.redo(buffers)?;
        self.applied += 1;
        Ok(Some(command.description()))
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.records.len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.applied
            .checked_sub(1)
            .map(|i| self.records[i].description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.records.get(self.applied).map(|c| c.description())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.records[..self.applied]
            .iter()
            .rev()
            .map(|c| c.description())
            .collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.applied = 0;
        self.total_memory = 0;
    }

    /// Undo `steps` times (index into `undo_history()`, 0 = most recent).
    pub fn undo_to(&mut self, steps: usize, buffers: &mut BufferArena) -> DocResult<()> {
        for _ in 0..steps {
            if self.undo(buffers)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Index of the last applied record, `-1` before the first.
    pub fn position(&self) -> isize {
        self.applied as isize - 1
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.applied
    }

    pub fn redo_count(&self) -> usize {
        self.records.len() - self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Point, Size, Surface};

    /// Set pixel (i, 0) to `value` in a live arena and record it.
    fn paint(
        history: &mut HistoryManager,
        arena: &mut BufferArena,
        key: &BufferKey,
        x: i32,
        value: i32,
    ) {
        let buf = arena.materialize(key);
        let before = buf.clone_data();
        buf.set_pixel(Point::new(x, 0), value).unwrap();
        let after = buf.clone_data();
        history.push(Box::new(AreaChange::new(key.clone(), before, after, format!("px {}", x))));
    }

    fn pixel(arena: &mut BufferArena, key: &BufferKey, x: i32) -> i32 {
        arena.materialize(key).get_pixel(Point::new(x, 0)).unwrap()
    }

    #[test]
    fn empty_history_is_noop() {
        let mut arena = BufferArena::new(Size::new(4, 1));
        let mut h = HistoryManager::new();
        assert_eq!(h.position(), -1);
        assert_eq!(h.undo(&mut arena).unwrap(), None);
        assert_eq!(h.redo(&mut arena).unwrap(), None);
    }

    #[test]
    fn undo_redo_restore_snapshots() {
        let key = BufferKey::new("l", "f");
        let mut arena = BufferArena::new(Size::new(4, 1));
        let mut h = HistoryManager::new();
        paint(&mut h, &mut arena, &key, 0, 3);
        paint(&mut h, &mut arena, &key, 1, 5);
        assert_eq!(h.position(), 1);

        assert_eq!(h.undo(&mut arena).unwrap().as_deref(), Some("px 1"));
        assert_eq!(pixel(&mut arena, &key, 1), -1);
        assert_eq!(pixel(&mut arena, &key, 0), 3);
        assert_eq!(h.redo_description().as_deref(), Some("px 1"));

        h.redo(&mut arena).unwrap();
        assert_eq!(pixel(&mut arena, &key, 1), 5);
        assert_eq!(h.undo_history(), vec!["px 1".to_string(), "px 0".to_string()]);
    }

    #[test]
    fn undo_after_layer_removal_leaves_no_orphan() {
        let kept = BufferKey::new("a", "f");
        let gone = BufferKey::new("b", "f");
        let mut arena = BufferArena::new(Size::new(4, 1));
        let mut h = HistoryManager::new();
        paint(&mut h, &mut arena, &kept, 0, 3);
        paint(&mut h, &mut arena, &gone, 1, 5);
        arena.remove_layer("b");

        assert_eq!(h.undo(&mut arena).unwrap().as_deref(), Some("px 1"));
        assert_eq!(h.undo(&mut arena).unwrap().as_deref(), Some("px 0"));
        h.redo(&mut arena).unwrap();
        h.redo(&mut arena).unwrap();
        assert_eq!(arena.len(), 1);
        assert!(!arena.contains(&gone));
        assert_eq!(pixel(&mut arena, &kept, 0), 3);
    }

    #[test]
    fn push_after_undo_truncates_tail() {
        let key = BufferKey::new("l", "f");
        let mut arena = BufferArena::new(Size::new(8, 1));
        let mut h = HistoryManager::new();
        for x in 0..5 {
            paint(&mut h, &mut arena, &key, x, x + 10);
        }
        h.undo_to(2, &mut arena).unwrap();
        paint(&mut h, &mut arena, &key, 7, 1);

        assert_eq!(h.len(), 4);
        assert_eq!(h.position(), 3);
        assert!(!h.can_redo());
        assert_eq!(h.redo(&mut arena).unwrap(), None);
        assert_eq!(pixel(&mut arena, &key, 4), -1);
    }

    #[test]
    fn memory_tracks_truncation() {
        let key = BufferKey::new("l", "f");
        let mut arena = BufferArena::new(Size::new(4, 1));
        let mut h = HistoryManager::new();
        paint(&mut h, &mut arena, &key, 0, 1);
        let one = h.memory_usage();
        assert_eq!(one, 2 * 4 * std::mem::size_of::<i32>());
        paint(&mut h, &mut arena, &key, 1, 1);
        h.undo(&mut arena).unwrap();
        paint(&mut h, &mut arena, &key, 2, 1);
        assert_eq!(h.memory_usage(), 2 * one);
        h.clear();
        assert_eq!(h.memory_usage(), 0);
        assert_eq!(h.position(), -1);
    }

    #[test]
    fn composite_undoes_every_part() {
        let a = BufferKey::new("l1", "f");
        let b = BufferKey::new("l2", "f");
        let mut arena = BufferArena::new(Size::new(2, 1));
        let mut parts = Vec::new();
        for key in [&a, &b] {
            let buf = arena.materialize(key);
            let before = buf.clone_data();
            buf.fill_all(4);
            parts.push(AreaChange::new(key.clone(), before, buf.clone_data(), ""));
        }
        let mut h = HistoryManager::new();
        h.push(Box::new(CompositeChange::new(parts, "Shift")));

        h.undo(&mut arena).unwrap();
        assert!(arena.get(&a).unwrap().is_blank());
        assert!(arena.get(&b).unwrap().is_blank());
        h.redo(&mut arena).unwrap();
        assert_eq!(pixel(&mut arena, &b, 1), 4);
    }

    #[test]
    fn failed_undo_keeps_position() {
        let key = BufferKey::new("l", "f");
        let mut arena = BufferArena::new(Size::new(4, 1));
        let mut h = HistoryManager::new();
        paint(&mut h, &mut arena, &key, 0, 1);
        arena.resize(Size::new(2, 2));
        assert!(h.undo(&mut arena).is_err());
        assert_eq!(h.position(), 0);
    }
}
