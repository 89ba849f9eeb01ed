//! Register allocation statistics.
//!
//! Tracks metrics during analysis and finalisation for verbose output.

use std::time::{Duration, Instant};

/// Register allocation statistics.
#[derive(Debug, Default, Clone)]
pub struct RegallocStats {
    /// Time spent computing liveness
    pub liveness_time: Duration,
    /// Time spent extracting conflicts and moves
    pub conflicts_time: Duration,
    /// Time spent in the spill-reload coalescer
    pub coalesce_time: Duration,
    /// Time spent rewriting and materialising spill code
    pub finalize_time: Duration,

    /// Number of basic blocks
    pub num_blocks: usize,
    /// Number of instructions analysed
    pub num_insts: usize,
    /// Number of SCCs
    pub num_sccs: usize,
    /// Number of cyclic SCCs
    pub num_cyclic_sccs: usize,
    /// Fixpoint rounds summed over all cyclic SCCs
    pub total_rounds: usize,
    /// Most rounds any single cyclic SCC needed
    pub max_rounds: usize,
    /// Number of conflict sets
    pub num_conflict_sets: usize,
    /// Number of move candidates from register moves
    pub num_moves: usize,
    /// Number of move candidates from spill/reload pairs
    pub num_spill_moves: usize,
    /// Number of moves removed after renaming
    pub num_moves_eliminated: usize,
    /// Number of spills materialised
    pub num_spills: usize,
    /// Number of reloads materialised
    pub num_reloads: usize,
}

impl RegallocStats {
    /// Create a new stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the fixpoint rounds of each cyclic SCC.
    pub fn record_rounds(&mut self, rounds: &[usize]) {
        self.num_cyclic_sccs += rounds.len();
        self.total_rounds += rounds.iter().sum::<usize>();
        self.max_rounds = rounds.iter().copied().fold(self.max_rounds, usize::max);
    }

    /// Fold another function's statistics into these.
    pub fn merge(&mut self, other: &RegallocStats) {
        self.liveness_time += other.liveness_time;
        self.conflicts_time += other.conflicts_time;
        self.coalesce_time += other.coalesce_time;
        self.finalize_time += other.finalize_time;
        self.num_blocks += other.num_blocks;
        self.num_insts += other.num_insts;
        self.num_sccs += other.num_sccs;
        self.num_cyclic_sccs += other.num_cyclic_sccs;
        self.total_rounds += other.total_rounds;
        self.max_rounds = self.max_rounds.max(other.max_rounds);
        self.num_conflict_sets += other.num_conflict_sets;
        self.num_moves += other.num_moves;
        self.num_spill_moves += other.num_spill_moves;
        self.num_moves_eliminated += other.num_moves_eliminated;
        self.num_spills += other.num_spills;
        self.num_reloads += other.num_reloads;
    }

    /// Total time across all phases.
    pub fn total_time(&self) -> Duration {
        self.liveness_time + self.conflicts_time + self.coalesce_time + self.finalize_time
    }

    /// Display statistics.
    pub fn display(&self) {
        eprintln!("\n=== Register Allocation Statistics ===");
        eprintln!("Blocks:        {}", self.num_blocks);
        eprintln!("Instructions:  {}", self.num_insts);
        eprintln!("SCCs:          {} ({} cyclic)", self.num_sccs, self.num_cyclic_sccs);
        eprintln!("Fixpoint:      {} rounds total, {} max",
            self.total_rounds,
            self.max_rounds
        );
        eprintln!("Conflict sets: {}", self.num_conflict_sets);
        eprintln!(
            "Moves:         {} (+{} from spill/reload)",
            self.num_moves, self.num_spill_moves
        );
        eprintln!("Eliminated:    {} moves", self.num_moves_eliminated);
        eprintln!("Spill code:    {} spills, {} reloads", self.num_spills, self.num_reloads);
        eprintln!();
        eprintln!("=== Timing ===");
        eprintln!("Liveness:     {:?}", self.liveness_time);
        eprintln!("Conflicts:    {:?}", self.conflicts_time);
        eprintln!("Coalescing:   {:?}", self.coalesce_time);
        eprintln!("Finalisation: {:?}", self.finalize_time);
        eprintln!("Total:        {:?}", self.total_time());
    }
}

/// Timer helper for measuring phase durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Stop the timer and return elapsed duration.
    pub fn stop(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = RegallocStats::new();
        assert_eq!(stats.num_blocks, 0);
        assert_eq!(stats.num_sccs, 0);
        assert_eq!(stats.total_time(), Duration::ZERO);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.stop();
        assert!(elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_record_rounds() {
        let mut stats = RegallocStats::new();
        stats.record_rounds(&[2, 5, 3]);
        stats.record_rounds(&[]);
        assert_eq!(stats.num_cyclic_sccs, 3);
        assert_eq!(stats.total_rounds, 10);
        assert_eq!(stats.max_rounds, 5);
    }

    #[test]
    fn test_merge() {
        let mut a = RegallocStats::new();
        a.num_blocks = 3;
        a.max_rounds = 2;
        let mut b = RegallocStats::new();
        b.num_blocks = 4;
        b.max_rounds = 7;
        b.num_spills = 1;
        a.merge(&b);
        assert_eq!(a.num_blocks, 7);
        assert_eq!(a.max_rounds, 7);
        assert_eq!(a.num_spills, 1);
    }
}
