//! In-process symmetric world.
//!
//! Each peer is a thread. Every peer owns a symmetric byte buffer and a
//! symmetric 64-bit counter; remote operations reach into the target
//! peer's copy. Non-blocking operations are queued on the issuing peer and
//! applied when it calls `quiet`.

use super::SymmetricContext;
use crate::error::{HarnessError, HarnessResult};
use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use std::sync::atomic::{fence, AtomicI64, Ordering};
use std::sync::{Arc, Barrier};
use tracing::{debug, warn};

/// Environment variables through which common launchers publish the rank
/// of each process they start.
const LAUNCHER_RANK_VARS: &[&str] = &[
    "PMI_RANK",
    "PMIX_RANK",
    "OMPI_COMM_WORLD_RANK",
    "MPI_LOCALRANKID",
    "SLURM_PROCID",
];

/// Rank assigned by an external parallel launcher, if any.
///
/// The local world runs all of its peers inside one process, so when a
/// launcher starts several copies only the one with rank 0 should run.
pub fn launcher_rank() -> Option<usize> {
    LAUNCHER_RANK_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok()?.trim().parse().ok())
}

struct PeerMemory {
    heap: RwLock<Vec<u8>>,
    counter: CachePadded<AtomicI64>,
}

/// Shared state of a world of `n_pes` peers
pub struct LocalWorld {
    peers: Vec<PeerMemory>,
    barrier: Barrier,
}

impl LocalWorld {
    /// Create a world whose symmetric buffers hold `heap_size` bytes.
    pub fn new(n_pes: usize, heap_size: usize) -> HarnessResult<Arc<Self>> {
        if n_pes < 2 {
            return Err(HarnessError::InvalidConfig(format!(
                "a symmetric world needs at least 2 peers, got {}",
                n_pes
            )));
        }
        let peers = (0..n_pes)
            .map(|_| PeerMemory {
                heap: RwLock::new(vec![0u8; heap_size]),
                counter: CachePadded::new(AtomicI64::new(0)),
            })
            .collect();
        Ok(Arc::new(Self {
            peers,
            barrier: Barrier::new(n_pes),
        }))
    }

    pub fn n_pes(&self) -> usize {
        self.peers.len()
    }

    pub fn heap_size(&self) -> usize {
        self.peers[0].heap.read().len()
    }

    #[cfg(test)]
    fn counter(&self, pe: usize) -> i64 {
        self.peers[pe].counter.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn heap_snapshot(&self, pe: usize) -> Vec<u8> {
        self.peers[pe].heap.read().clone()
    }

    /// Run `body` once per peer, each on its own thread, and collect the
    /// results in rank order.
    ///
    /// Threads are pinned to distinct cores when the host has enough.
    pub fn run<F, R>(self: &Arc<Self>, body: F) -> Vec<R>
    where
        F: Fn(LocalPe) -> R + Sync,
        R: Send,
    {
        let n_pes = self.n_pes();
        let cores = core_affinity::get_core_ids().unwrap_or_default();
        let pin = cores.len() >= n_pes;
        if !pin {
            warn!(
                "Only {} cores available for {} peers; threads will not be pinned",
                cores.len(),
                n_pes
            );
        }

        std::thread::scope(|scope| {
            let body = &body;
            let handles: Vec<_> = (0..n_pes)
                .map(|rank| {
                    let pe = LocalPe::new(Arc::clone(self), rank);
                    let core = if pin { cores.get(rank).copied() } else { None };
                    scope.spawn(move || {
                        if let Some(core) = core {
                            if !core_affinity::set_for_current(core) {
                                debug!("PE {} could not be pinned to core {:?}", rank, core.id);
                            }
                        }
                        body(pe)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

/// Outgoing puts to one target, not yet applied.
///
/// Every put writes from offset 0 of the symmetric buffer, so applying a
/// sequence of them in order leaves the same bytes as applying this overlay
/// once: each put overwrites the prefix it covers.
#[derive(Default)]
struct StagedPuts {
    data: Vec<u8>,
    dirty: usize,
}

impl StagedPuts {
    fn stage(&mut self, src: &[u8], heap_size: usize) {
        if self.data.len() < heap_size {
            self.data.resize(heap_size, 0);
        }
        self.data[..src.len()].copy_from_slice(src);
        self.dirty = self.dirty.max(src.len());
    }
}

/// One peer's view of a [`LocalWorld`]
pub struct LocalPe {
    world: Arc<LocalWorld>,
    rank: usize,
    heap_size: usize,
    /// Indexed by target rank
    staged: Vec<StagedPuts>,
    /// `(target, len)` of outstanding gets, in issue order
    pending_gets: Vec<(usize, usize)>,
    landing: Vec<u8>,
}

impl LocalPe {
    fn new(world: Arc<LocalWorld>, rank: usize) -> Self {
        let heap_size = world.heap_size();
        let staged = (0..world.n_pes()).map(|_| StagedPuts::default()).collect();
        Self {
            world,
            rank,
            heap_size,
            staged,
            pending_gets: Vec::new(),
            landing: vec![0u8; heap_size],
        }
    }

    #[cfg(test)]
    fn landing(&self) -> &[u8] {
        &self.landing
    }

    #[cfg(test)]
    fn staged_bytes(&self) -> usize {
        self.staged.iter().map(|s| s.data.capacity()).sum()
    }

    fn counter(&self, pe: usize) -> &AtomicI64 {
        &self.world.peers[pe].counter
    }
}

impl SymmetricContext for LocalPe {
    fn my_pe(&self) -> usize {
        self.rank
    }

    fn n_pes(&self) -> usize {
        self.world.n_pes()
    }

    fn backend_name(&self) -> String {
        "local-threads".to_string()
    }

    fn barrier_all(&self) {
        self.world.barrier.wait();
    }

    fn quiet(&mut self) {
        for (pe, staged) in self.staged.iter_mut().enumerate() {
            if staged.dirty > 0 {
                let len = staged.dirty;
                self.world.peers[pe].heap.write()[..len].copy_from_slice(&staged.data[..len]);
                staged.dirty = 0;
            }
        }
        for (pe, len) in self.pending_gets.drain(..) {
            self.landing[..len].copy_from_slice(&self.world.peers[pe].heap.read()[..len]);
        }
        fence(Ordering::SeqCst);
    }

    fn atomic_fetch(&self, pe: usize) -> i64 {
        self.counter(pe).load(Ordering::SeqCst)
    }

    fn atomic_add(&self, value: i64, pe: usize) {
        self.counter(pe).fetch_add(value, Ordering::SeqCst);
    }

    fn atomic_compare_swap(&self, cond: i64, value: i64, pe: usize) -> i64 {
        match self
            .counter(pe)
            .compare_exchange(cond, value, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    fn atomic_inc(&self, pe: usize) {
        self.counter(pe).fetch_add(1, Ordering::SeqCst);
    }

    fn atomic_swap(&self, value: i64, pe: usize) -> i64 {
        self.counter(pe).swap(value, Ordering::SeqCst)
    }

    fn atomic_set(&self, value: i64, pe: usize) {
        self.counter(pe).store(value, Ordering::SeqCst);
    }

    fn get(&self, dest: &mut [u8], pe: usize) {
        let heap = self.world.peers[pe].heap.read();
        dest.copy_from_slice(&heap[..dest.len()]);
    }

    fn put(&self, src: &[u8], pe: usize) {
        self.world.peers[pe].heap.write()[..src.len()].copy_from_slice(src);
    }

    fn get_nbi(&mut self, len: usize, pe: usize) {
        // Back-to-back gets of the same range land the same bytes.
        if self.pending_gets.last() != Some(&(pe, len)) {
            self.pending_gets.push((pe, len));
        }
    }

    fn put_nbi(&mut self, src: &[u8], pe: usize) {
        self.staged[pe].stage(src, self.heap_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{measure, run_driver, Measurement};
    use crate::extract::{extract_bandwidth_points, extract_latency};
    use crate::primitive::Primitive;

    #[test]
    fn test_world_needs_two_peers() {
        assert!(LocalWorld::new(1, 8).is_err());
        assert!(LocalWorld::new(2, 8).is_ok());
    }

    #[test]
    fn test_run_returns_results_in_rank_order() {
        let world = LocalWorld::new(3, 8).unwrap();
        let ranks = world.run(|pe| (pe.my_pe(), pe.n_pes()));
        assert_eq!(ranks, vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_atomics_target_remote_counter() {
        let world = LocalWorld::new(2, 8).unwrap();
        world.run(|pe| {
            pe.atomic_add(5, 0);
            pe.barrier_all();
            pe.atomic_inc(0);
        });
        assert_eq!(world.counter(0), 12);
        assert_eq!(world.counter(1), 0);
    }

    #[test]
    fn test_compare_swap_returns_previous_value() {
        let world = LocalWorld::new(2, 8).unwrap();
        let results = world.run(|pe| {
            if pe.my_pe() == 0 {
                let first = pe.atomic_compare_swap(0, 7, 1);
                let second = pe.atomic_compare_swap(0, 9, 1);
                let swapped = pe.atomic_swap(3, 1);
                Some((first, second, swapped))
            } else {
                None
            }
        });
        assert_eq!(results[0], Some((0, 7, 7)));
        assert_eq!(world.counter(1), 3);
    }

    #[test]
    fn test_put_and_get_move_bytes_between_peers() {
        let world = LocalWorld::new(2, 4).unwrap();
        let fetched = world.run(|pe| {
            if pe.my_pe() == 0 {
                pe.put(&[1, 2, 3, 4], 1);
            }
            pe.barrier_all();
            let mut buf = [0u8; 4];
            pe.get(&mut buf, 1);
            buf
        });
        assert_eq!(fetched, vec![[1, 2, 3, 4], [1, 2, 3, 4]]);
    }

    #[test]
    fn test_non_blocking_ops_complete_at_quiet() {
        let world = LocalWorld::new(2, 4).unwrap();
        let observed = world.run(|mut pe| {
            if pe.my_pe() == 0 {
                pe.put_nbi(&[9, 9], 1);
                let before = world.heap_snapshot(1)[0];
                pe.quiet();
                pe.barrier_all();
                before
            } else {
                pe.barrier_all();
                pe.get_nbi(2, 1);
                pe.quiet();
                pe.landing()[0]
            }
        });
        assert_eq!(observed, vec![0, 9]);
        assert_eq!(&world.heap_snapshot(1)[..2], &[9, 9]);
    }

    #[test]
    fn test_queued_puts_apply_in_issue_order() {
        let world = LocalWorld::new(2, 4).unwrap();
        world.run(|mut pe| {
            if pe.my_pe() == 0 {
                pe.put_nbi(&[1, 1, 1, 1], 1);
                pe.put_nbi(&[2, 2], 1);
                pe.put_nbi(&[3], 1);
                pe.quiet();
            }
            pe.barrier_all();
        });
        assert_eq!(world.heap_snapshot(1), vec![3, 2, 1, 1]);
    }

    #[test]
    fn test_put_nbi_staging_does_not_grow_with_ntimes() {
        let heap = 1024;
        let world = LocalWorld::new(2, heap).unwrap();
        let src = vec![7u8; heap];
        let staged = world.run(|mut pe| {
            let target = (pe.my_pe() + 1) % pe.n_pes();
            for _ in 0..10_000 {
                pe.put_nbi(&src, target);
                pe.get_nbi(heap, target);
            }
            let staged = (pe.staged_bytes(), pe.pending_gets.len());
            pe.quiet();
            pe.barrier_all();
            staged
        });
        for (bytes, gets) in staged {
            assert!(bytes <= 2 * heap, "staged {} bytes", bytes);
            assert_eq!(gets, 1);
        }
        assert_eq!(world.heap_snapshot(0), src);
        assert_eq!(world.heap_snapshot(1), src);
    }

    #[test]
    fn test_every_peer_sees_same_sweep_sizes() {
        let sizes = [1, 2, 4];
        let world = LocalWorld::new(2, 4).unwrap();
        let measurements = world.run(|mut pe| measure(&mut pe, Primitive::PutNbi, 10, &sizes));
        for measurement in measurements {
            match measurement {
                Measurement::Sweep(points) => {
                    let got: Vec<usize> = points.iter().map(|p| p.size).collect();
                    assert_eq!(got, sizes);
                    assert!(points.iter().all(|p| p.timing.ntimes == 10));
                }
                other => panic!("expected a sweep, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_only_rank_zero_prints() {
        let world = LocalWorld::new(2, 1).unwrap();
        let outputs = world.run(|mut pe| {
            let mut out = Vec::new();
            run_driver(&mut pe, Primitive::AtomicInc, 50, &[], &mut out).unwrap();
            String::from_utf8(out).unwrap()
        });
        assert!(outputs[1].is_empty());
        assert!(outputs[0].contains("Avg Time per Increment (us):"));
        assert!(extract_latency(&outputs[0]).is_ok());
        assert_eq!(world.counter(0), 100);
    }

    #[test]
    fn test_get_sweep_output_parses() {
        let sizes = [1, 8, 64];
        let world = LocalWorld::new(2, 64).unwrap();
        let outputs = world.run(|mut pe| {
            let mut out = Vec::new();
            run_driver(&mut pe, Primitive::Get, 20, &sizes, &mut out).unwrap();
            String::from_utf8(out).unwrap()
        });
        let points = extract_bandwidth_points(&outputs[0]);
        assert!(points.iter().all(|p| sizes.contains(&p.size)));
        assert!(points.windows(2).all(|w| w[0].size < w[1].size));
    }
}
