//! Worker pool sizing.

use log::warn;

/// Resolve the configured worker count for the region pool.
///
/// Zero asks for one worker per available CPU. Oversubscription is
/// allowed but flagged, since region workers are CPU bound and extra
/// threads only add contention.
pub fn resolve_worker_threads(requested: usize) -> usize {
    let available = num_cpus::get();
    if requested == 0 {
        return available.max(1);
    }
    if requested > available {
        warn!(
            "{} worker threads requested but only {} CPUs are available",
            requested, available
        );
    }
    requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_resolves_to_available_cpus() {
        assert_eq!(resolve_worker_threads(0), num_cpus::get().max(1));
    }

    #[test]
    fn explicit_counts_pass_through() {
        assert_eq!(resolve_worker_threads(1), 1);
        assert_eq!(resolve_worker_threads(10_000), 10_000);
    }
}
