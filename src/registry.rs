// ABOUTME: Callback registry tying in-flight request indices to waiting completions
// ABOUTME: Slot indices are recycled through a LIFO reclaim stack and fit the wire format

use crate::bridge::Value;
use crate::messages::RequestError;
use tokio::sync::oneshot;

/// Completion handle fulfilled when the matching response is dispatched.
pub type CompletionSender = oneshot::Sender<Result<Value, RequestError>>;

/// Registry of in-flight requests, keyed by callback index.
///
/// Allocation pops the reclaim stack before growing the slot array, so the
/// array's length is the high-water mark of concurrently outstanding
/// requests and an index is never live twice at once.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    slots: Vec<Option<CompletionSender>>,
    reclaim: Vec<usize>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a completion and return the index to carry on the wire.
    pub fn insert(&mut self, sender: CompletionSender) -> usize {
        match self.reclaim.pop() {
            Some(index) => {
                self.slots[index] = Some(sender);
                index
            }
            None => {
                self.slots.push(Some(sender));
                self.slots.len() - 1
            }
        }
    }

    /// Remove and return the completion for `index`, reclaiming the slot.
    ///
    /// Returns `None` when the index is out of range or the slot is not
    /// live; callers treat that as a protocol violation.
    pub fn take(&mut self, index: usize) -> Option<CompletionSender> {
        let sender = self.slots.get_mut(index)?.take()?;
        self.reclaim.push(index);
        Some(sender)
    }

    /// Remove every live completion, reclaiming all slots. Used when the
    /// connection is torn down and every waiter must be rejected.
    pub fn drain(&mut self) -> Vec<CompletionSender> {
        let mut drained = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(sender) = slot.take() {
                self.reclaim.push(index);
                drained.push(sender);
            }
        }
        drained
    }

    /// Number of requests currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// High-water mark of concurrently outstanding requests.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Depth of the reclaim stack.
    pub fn reclaimed(&self) -> usize {
        self.reclaim.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> CompletionSender {
        oneshot::channel().0
    }

    #[test]
    fn indices_grow_sequentially() {
        let mut registry = CallbackRegistry::new();
        assert_eq!(registry.insert(sender()), 0);
        assert_eq!(registry.insert(sender()), 1);
        assert_eq!(registry.insert(sender()), 2);
        assert_eq!(registry.capacity(), 3);
    }

    #[test]
    fn reclaimed_index_is_reused_lifo() {
        let mut registry = CallbackRegistry::new();
        registry.insert(sender());
        registry.insert(sender());
        registry.insert(sender());

        assert!(registry.take(1).is_some());
        assert!(registry.take(0).is_some());
        // Most recently reclaimed comes back first.
        assert_eq!(registry.insert(sender()), 0);
        assert_eq!(registry.insert(sender()), 1);
        // Stack exhausted, array grows again.
        assert_eq!(registry.insert(sender()), 3);
    }

    #[test]
    fn take_is_single_shot() {
        let mut registry = CallbackRegistry::new();
        let index = registry.insert(sender());
        assert!(registry.take(index).is_some());
        assert!(registry.take(index).is_none());
    }

    #[test]
    fn take_out_of_range_is_none() {
        let mut registry = CallbackRegistry::new();
        assert!(registry.take(0).is_none());
        registry.insert(sender());
        assert!(registry.take(5).is_none());
    }

    #[test]
    fn drain_rejects_everything_once() {
        let mut registry = CallbackRegistry::new();
        for _ in 0..4 {
            registry.insert(sender());
        }
        registry.take(2);
        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(registry.outstanding(), 0);
        assert_eq!(registry.reclaimed(), 4);
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn full_reclaim_never_grows_past_high_water_mark() {
        let mut registry = CallbackRegistry::new();
        let indices: Vec<usize> = (0..100).map(|_| registry.insert(sender())).collect();
        for index in &indices {
            assert!(registry.take(*index).is_some());
        }
        assert_eq!(registry.reclaimed(), 100);
        for _ in 0..100 {
            assert!(registry.insert(sender()) < 100);
        }
        assert_eq!(registry.capacity(), 100);
    }
}
