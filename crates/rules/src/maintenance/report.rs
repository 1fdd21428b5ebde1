/// Entries removed by one sweep or one rule eviction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub silences: usize,
    pub clients: usize,
    pub windows: usize,
    pub cursors: usize,
    pub hits: usize,
    /// Stores whose cleanup failed.
    pub failed_steps: usize,
}

impl SweepReport {
    /// Total entries removed across all stores.
    pub fn removed(&self) -> usize {
        self.silences + self.clients + self.windows + self.cursors + self.hits
    }

    pub fn is_clean(&self) -> bool {
        self.failed_steps == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_sums_every_store() {
        let report = SweepReport {
            silences: 2,
            clients: 1,
            windows: 3,
            cursors: 1,
            hits: 10,
            failed_steps: 0,
        };
        assert_eq!(report.removed(), 17);
        assert!(report.is_clean());
    }
}
