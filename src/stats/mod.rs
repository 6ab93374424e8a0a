mod histogram;
mod join_optimizer;
mod table_stats;

pub use histogram::{IntHistogram, StringHistogram};
pub use join_optimizer::{JoinNode, JoinOptimizer};
pub use table_stats::{compute_statistics, get_table_stats, set_table_stats, TableStats};

use std::sync::atomic::{AtomicUsize, Ordering};

pub const DEFAULT_IO_COST_PER_PAGE: usize = 1000;
pub const DEFAULT_HISTOGRAM_BINS: usize = 100;

static IO_COST_PER_PAGE: AtomicUsize = AtomicUsize::new(DEFAULT_IO_COST_PER_PAGE);
static HISTOGRAM_BINS: AtomicUsize = AtomicUsize::new(DEFAULT_HISTOGRAM_BINS);

pub fn get_io_cost_per_page() -> usize {
    IO_COST_PER_PAGE.load(Ordering::Relaxed)
}

pub fn set_io_cost_per_page(cost: usize) {
    IO_COST_PER_PAGE.store(cost, Ordering::Relaxed);
}

pub fn get_histogram_bins() -> usize {
    HISTOGRAM_BINS.load(Ordering::Relaxed)
}

pub fn set_histogram_bins(bins: usize) {
    HISTOGRAM_BINS.store(bins, Ordering::Relaxed);
}

pub fn reset_config() {
    IO_COST_PER_PAGE.store(DEFAULT_IO_COST_PER_PAGE, Ordering::Relaxed);
    HISTOGRAM_BINS.store(DEFAULT_HISTOGRAM_BINS, Ordering::Relaxed);
    table_stats::clear_stats();
}
