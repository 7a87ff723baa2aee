//! Processor-count probes.
//!
//! These are opaque environment queries; the engine calls them to pick a
//! default pool width but does not interpret them further.

/// Number of logical processors.
///
/// This is the default worker count for a process pool.
pub fn processor_count() -> usize {
    num_cpus::get()
}

/// Number of physical cores.
///
/// Useful for CPU-bound work where hyperthread siblings only add contention.
pub fn physical_processor_count() -> usize {
    num_cpus::get_physical()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_are_positive() {
        assert!(processor_count() >= 1);
        assert!(physical_processor_count() >= 1);
    }

    #[test]
    fn test_physical_not_above_logical() {
        assert!(physical_processor_count() <= processor_count());
    }
}
