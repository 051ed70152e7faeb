use std::sync::Mutex;

/// Pool of per-worker scratch objects.
///
/// Workers check a scratch object out at the start of a block and return it
/// when done, so the number of live objects never exceeds the number of
/// concurrently running workers. [`ScratchPool::reserve`] lets the
/// dispatching thread grow the pool before workers start; `take` still
/// creates on demand if the pool runs dry.
pub struct ScratchPool<S> {
    items: Mutex<Vec<S>>,
    factory: Box<dyn Fn() -> S + Send + Sync>,
}

impl<S> ScratchPool<S> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            items: Mutex::new(Vec::new()),
            factory: Box::new(factory),
        }
    }

    /// Grows the pool to at least `count` objects. Call from the dispatching
    /// thread before spawning workers.
    pub fn reserve(&self, count: usize) {
        let mut items = self.items.lock().unwrap();
        while items.len() < count {
            items.push((self.factory)());
        }
    }

    pub fn take(&self) -> S {
        let recycled = self.items.lock().unwrap().pop();
        recycled.unwrap_or_else(|| (self.factory)())
    }

    pub fn put(&self, item: S) {
        self.items.lock().unwrap().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

/// Splits `[begin, end)` into contiguous blocks of at least `min_block`
/// elements. The final block absorbs the remainder, so it may be larger than
/// the others.
pub fn partition_blocks(begin: usize, end: usize, min_block: usize) -> Vec<(usize, usize)> {
    if begin >= end {
        return Vec::new();
    }
    let len = end - begin;
    let min_block = min_block.max(1);
    let num_blocks = (len / min_block).max(1);
    let block_size = len / num_blocks;

    let mut blocks = Vec::with_capacity(num_blocks);
    for i in 0..num_blocks {
        let lo = begin + i * block_size;
        let hi = if i + 1 == num_blocks { end } else { lo + block_size };
        blocks.push((lo, hi));
    }
    blocks
}

/// Runs `f(scratch, lo, hi)` over contiguous blocks of `[begin, end)`.
///
/// With `concurrent == false` the whole range is handed to a single call;
/// otherwise blocks are dispatched onto the rayon pool in unspecified order.
/// Each invocation owns its scratch object for the duration of the block.
pub fn loop_blocks<S, F>(
    concurrent: bool,
    begin: usize,
    end: usize,
    min_block: usize,
    pool: &ScratchPool<S>,
    f: F,
) where
    S: Send,
    F: Fn(&mut S, usize, usize) + Send + Sync,
{
    if begin >= end {
        return;
    }
    if !concurrent {
        let mut scratch = pool.take();
        f(&mut scratch, begin, end);
        pool.put(scratch);
        return;
    }

    let blocks = partition_blocks(begin, end, min_block);
    pool.reserve(blocks.len().min(rayon::current_num_threads()));
    let f = &f;
    rayon::scope(|scope| {
        for &(lo, hi) in &blocks {
            scope.spawn(move |_| {
                let mut scratch = pool.take();
                f(&mut scratch, lo, hi);
                pool.put(scratch);
            });
        }
    });
}

/// Like [`loop_blocks`], but also hands each block the disjoint slice of
/// `out` it owns: index `i` of the range maps to
/// `out[(i - begin) * items_per_index ..][..items_per_index]`. Workers write
/// their output rows without any locking.
pub fn loop_blocks_sliced<S, T, F>(
    concurrent: bool,
    begin: usize,
    end: usize,
    min_block: usize,
    items_per_index: usize,
    out: &mut [T],
    pool: &ScratchPool<S>,
    f: F,
) where
    S: Send,
    T: Send,
    F: Fn(&mut S, usize, usize, &mut [T]) + Send + Sync,
{
    if begin >= end {
        return;
    }
    assert_eq!(
        out.len(),
        (end - begin) * items_per_index,
        "output slice must cover the dispatched range exactly"
    );
    if !concurrent {
        let mut scratch = pool.take();
        f(&mut scratch, begin, end, out);
        pool.put(scratch);
        return;
    }

    let blocks = partition_blocks(begin, end, min_block);
    pool.reserve(blocks.len().min(rayon::current_num_threads()));

    let mut tasks = Vec::with_capacity(blocks.len());
    let mut rest = out;
    for &(lo, hi) in &blocks {
        let (head, tail) = rest.split_at_mut((hi - lo) * items_per_index);
        tasks.push((lo, hi, head));
        rest = tail;
    }

    let f = &f;
    rayon::scope(|scope| {
        for (lo, hi, slice) in tasks {
            scope.spawn(move |_| {
                let mut scratch = pool.take();
                f(&mut scratch, lo, hi, slice);
                pool.put(scratch);
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_partition_covers_range() {
        let blocks = partition_blocks(3, 103, 12);
        assert_eq!(blocks.first().unwrap().0, 3);
        assert_eq!(blocks.last().unwrap().1, 103);
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        for &(lo, hi) in &blocks {
            assert!(hi - lo >= 12);
        }
    }

    #[test]
    fn test_partition_last_block_takes_remainder() {
        let blocks = partition_blocks(0, 10, 3);
        // 10 / 3 = 3 blocks of 3, last absorbs the extra element.
        assert_eq!(blocks, vec![(0, 3), (3, 6), (6, 10)]);
    }

    #[test]
    fn test_partition_small_range_single_block() {
        assert_eq!(partition_blocks(5, 7, 10), vec![(5, 7)]);
        assert!(partition_blocks(7, 7, 10).is_empty());
    }

    #[test]
    fn test_loop_blocks_visits_every_index() {
        let counter = AtomicUsize::new(0);
        let pool = ScratchPool::new(|| 0usize);
        loop_blocks(true, 0, 97, 8, &pool, |_, lo, hi| {
            counter.fetch_add(hi - lo, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 97);
    }

    #[test]
    fn test_loop_blocks_serial_single_call() {
        let calls = AtomicUsize::new(0);
        let pool = ScratchPool::new(|| ());
        loop_blocks(false, 2, 50, 4, &pool, |_, lo, hi| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!((lo, hi), (2, 50));
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sliced_serial_matches_parallel() {
        let width = 7;
        let run = |concurrent: bool| {
            let mut out = vec![0u32; 33 * width];
            let pool = ScratchPool::new(|| ());
            loop_blocks_sliced(concurrent, 0, 33, 5, width, &mut out, &pool, |_, lo, hi, slice| {
                for (i, row) in slice.chunks_mut(width).enumerate() {
                    let y = lo + i;
                    for (x, v) in row.iter_mut().enumerate() {
                        *v = (y * 100 + x) as u32;
                    }
                }
                assert_eq!(slice.len(), (hi - lo) * width);
            });
            out
        };
        assert_eq!(run(false), run(true));
    }

    #[test]
    fn test_scratch_pool_recycles() {
        let pool = ScratchPool::new(|| vec![0u8; 16]);
        pool.reserve(2);
        assert_eq!(pool.len(), 2);
        let a = pool.take();
        let b = pool.take();
        assert!(pool.is_empty());
        pool.put(a);
        pool.put(b);
        assert_eq!(pool.len(), 2);
    }
}
