//! Per-tick traded quantity derived from cumulative session volume.

/// Tracks the last cumulative volume that produced an accepted trade, so the
/// next tick's quantity can be read as the difference. Tolerates session
/// resets (cumulative going backwards) and implausible jumps by falling back
/// to the tick's own last-traded quantity.
#[derive(Debug, Clone, Default)]
pub struct VolumeExtractor {
    last_processed_cum_volume: Option<i64>,
}

impl VolumeExtractor {
    /// Traded quantity for one tick; zero means "nothing usable".
    pub fn extract(
        &mut self,
        last_traded_qty: Option<i64>,
        cum_volume: Option<i64>,
        max_step: i64,
    ) -> i64 {
        let qty = last_traded_qty.filter(|q| *q > 0).unwrap_or(0);

        if let Some(cum) = cum_volume.filter(|c| *c >= 0) {
            let last = match self.last_processed_cum_volume {
                // first sighting is the baseline, not a trade
                None => {
                    self.last_processed_cum_volume = Some(cum);
                    return qty;
                }
                Some(last) => last,
            };

            if cum < last {
                // session reset or rollover: re-baseline
                self.last_processed_cum_volume = Some(cum);
                return qty;
            }

            let step = cum - last;
            if step > 0 && step <= max_step {
                self.last_processed_cum_volume = Some(cum);
                return step;
            }

            // stale or implausible cumulative; the raw quantity is best effort
            if qty > 0 {
                self.last_processed_cum_volume = Some(cum);
                return qty;
            }
            return 0;
        }

        qty
    }

    pub fn last_processed(&self) -> Option<i64> {
        self.last_processed_cum_volume
    }

    /// Re-baseline from an external snapshot (historical seeding).
    pub fn seed(&mut self, cum_volume: i64) {
        self.last_processed_cum_volume = Some(cum_volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_STEP: i64 = 2_000_000;

    #[test]
    fn test_first_sighting_is_baseline() {
        let mut extractor = VolumeExtractor::default();
        assert_eq!(extractor.extract(Some(10), Some(1000), MAX_STEP), 10);
        assert_eq!(extractor.last_processed(), Some(1000));
    }

    #[test]
    fn test_cumulative_difference() {
        let mut extractor = VolumeExtractor::default();
        extractor.extract(None, Some(1000), MAX_STEP);
        assert_eq!(extractor.extract(None, Some(1025), MAX_STEP), 25);
        assert_eq!(extractor.extract(None, Some(1025), MAX_STEP), 0);
        assert_eq!(extractor.last_processed(), Some(1025));
    }

    #[test]
    fn test_session_reset_rebaselines() {
        let mut extractor = VolumeExtractor::default();
        extractor.extract(None, Some(500_000), MAX_STEP);
        assert_eq!(extractor.extract(Some(7), Some(10), MAX_STEP), 7);
        assert_eq!(extractor.last_processed(), Some(10));
    }

    #[test]
    fn test_implausible_jump_falls_back_to_qty() {
        let mut extractor = VolumeExtractor::default();
        extractor.extract(None, Some(1000), MAX_STEP);
        assert_eq!(extractor.extract(Some(15), Some(5_000_000), MAX_STEP), 15);
        assert_eq!(extractor.last_processed(), Some(5_000_000));

        // without a usable quantity the tick is dropped and the baseline kept
        let mut extractor = VolumeExtractor::default();
        extractor.extract(None, Some(1000), MAX_STEP);
        assert_eq!(extractor.extract(None, Some(9_000_000), MAX_STEP), 0);
        assert_eq!(extractor.last_processed(), Some(1000));
    }

    #[test]
    fn test_no_cumulative_uses_qty() {
        let mut extractor = VolumeExtractor::default();
        assert_eq!(extractor.extract(Some(12), None, MAX_STEP), 12);
        assert_eq!(extractor.extract(Some(0), None, MAX_STEP), 0);
        assert_eq!(extractor.extract(None, None, MAX_STEP), 0);
        assert_eq!(extractor.last_processed(), None);
    }
}
