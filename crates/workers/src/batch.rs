use parking_lot::{Condvar, Mutex};

/// The outputs of a batch of jobs, filled as the jobs complete.
struct State<O> {
    outputs: Vec<Option<O>>,
    remaining: usize,
}

/// Collects the outputs of a batch of jobs submitted to a [`WorkerPool`](crate::WorkerPool).
pub struct Batch<O> {
    state: Mutex<State<O>>,
    /// Notified when the last job of the batch completes.
    done: Condvar,
}

impl<O> Batch<O> {
    /// Creates a new [`Batch`] expecting `len` outputs.
    pub fn new(len: usize) -> Self {
        Self {
            state: Mutex::new(State {
                outputs: std::iter::repeat_with(|| None).take(len).collect(),
                remaining: len,
            }),
            done: Condvar::new(),
        }
    }

    /// Returns the slot of the job at `index`.
    ///
    /// The slot counts as completed when it is dropped, even if the job panicked before filling
    /// it. This keeps [`Batch::wait`] from blocking forever.
    #[inline]
    pub fn slot(&self, index: usize) -> Slot<'_, O> {
        Slot { batch: self, index }
    }

    /// Blocks until every job of the batch completed, and returns their outputs in order.
    ///
    /// # Panics
    ///
    /// Panics if a job panicked before filling its slot.
    pub fn wait(&self) -> Vec<O> {
        let mut lock = self.state.lock();
        while lock.remaining != 0 {
            self.done.wait(&mut lock);
        }

        std::mem::take(&mut lock.outputs)
            .into_iter()
            .enumerate()
            .map(|(index, output)| match output {
                Some(output) => output,
                None => panic!("job #{index} of the batch panicked"),
            })
            .collect()
    }
}

/// The output slot of a single job of a [`Batch`].
pub struct Slot<'a, O> {
    batch: &'a Batch<O>,
    index: usize,
}

impl<O> Slot<'_, O> {
    /// Stores the output of the job.
    pub fn fill(self, output: O) {
        self.batch.state.lock().outputs[self.index] = Some(output);
    }
}

impl<O> Drop for Slot<'_, O> {
    fn drop(&mut self) {
        let mut lock = self.batch.state.lock();
        lock.remaining -= 1;
        if lock.remaining == 0 {
            self.batch.done.notify_all();
        }
    }
}
