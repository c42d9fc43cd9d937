use crate::interrupt::Interrupt;
use crate::scheduler::Context;

use tracing::debug;

/// A scheduling context plus the interrupt of the sub-pipeline it runs.
struct Fiber {
    context: Context,
    interrupt: Interrupt,
    done: bool,
}

/// The fibers of one concurrent stage.
///
/// Finished fibers are kept on a free list and handed out again, with a
/// fresh interrupt, before any new fiber is created.
pub(crate) struct FiberPool {
    fibers: Vec<Fiber>,
    idle: Vec<usize>,
}

impl FiberPool {
    pub(crate) fn new() -> Self {
        Self {
            fibers: Vec::new(),
            idle: Vec::new(),
        }
    }

    /// Returns an idle fiber, or a new one running in the context built
    /// by `context`, as `(index, interrupt, context)`.
    pub(crate) fn acquire<C>(&mut self, context: C) -> (usize, Interrupt, Context)
    where
        C: FnOnce(usize) -> Context,
    {
        let index = match self.idle.pop() {
            Some(index) => {
                let fiber = &mut self.fibers[index];
                fiber.done = false;
                fiber.interrupt = Interrupt::new();
                debug!(fiber = index, context = %fiber.context.name(), "reusing fiber");
                index
            }
            None => {
                let index = self.fibers.len();
                let context = context(index);
                debug!(fiber = index, context = %context.name(), "creating fiber");
                self.fibers.push(Fiber {
                    context,
                    interrupt: Interrupt::new(),
                    done: false,
                });
                index
            }
        };

        let fiber = &self.fibers[index];
        (index, fiber.interrupt.clone(), fiber.context.clone())
    }

    /// Marks the fiber at `index` as done and makes it reusable.
    ///
    /// # Panics
    ///
    /// Panics if the fiber is already done.
    pub(crate) fn finish(&mut self, index: usize) {
        let fiber = &mut self.fibers[index];
        assert!(!fiber.done, "fiber finished twice");

        fiber.done = true;
        self.idle.push(index);
    }

    pub(crate) fn all_done(&self) -> bool {
        self.idle.len() == self.fibers.len()
    }

    /// Interrupts of the fibers still running, to be triggered once the
    /// caller released whatever it holds.
    pub(crate) fn running(&self) -> Vec<Interrupt> {
        self.fibers
            .iter()
            .filter(|fiber| !fiber.done)
            .map(|fiber| fiber.interrupt.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_fiber_is_reused_with_fresh_interrupt() {
        let mut pool = FiberPool::new();

        let (first, interrupt, _) = pool.acquire(|i| Context::new(format!("fiber {i}")));
        interrupt.trigger();
        pool.finish(first);
        assert!(pool.all_done());

        let (second, interrupt, context) = pool.acquire(|_| unreachable!());
        assert_eq!(first, second);
        assert!(!interrupt.triggered());
        assert_eq!(context.name(), "fiber 0");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_running_lists_unfinished_fibers() {
        let mut pool = FiberPool::new();

        let (a, _, _) = pool.acquire(|i| Context::new(format!("fiber {i}")));
        let (_, b, _) = pool.acquire(|i| Context::new(format!("fiber {i}")));
        pool.finish(a);

        let running = pool.running();
        assert_eq!(running.len(), 1);

        running[0].trigger();
        assert!(b.triggered());
        assert!(!pool.all_done());
    }
}
