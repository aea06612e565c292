//! Think-time allocation from the remaining clock.
//!
//! The allocation is a fraction of the remaining time chosen from a tier
//! table, shortened during the opening, topped up by part of the increment
//! and clamped so a single move can never flag.

/// Fraction of the remaining time spent on one move once at least
/// `min_remaining_ms` is left on the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeTier {
    pub min_remaining_ms: u64,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimePolicy {
    /// Shortest think time ever returned, also used with an empty clock
    pub floor_secs: f64,
    /// Longest think time ever returned
    pub ceiling_secs: f64,
    /// Clock reserve a single move may not eat into
    pub safety_buffer_ms: u64,
    /// Ascending by `min_remaining_ms`; the first tier starts at zero
    pub tiers: Vec<TimeTier>,
    /// Full moves played with the reduced opening allocation
    pub opening_moves: u32,
    pub opening_factor: f64,
    /// Share of the increment added on top of the tier allocation
    pub increment_fraction: f64,
}

impl Default for TimePolicy {
    fn default() -> Self {
        Self {
            floor_secs: 0.05,
            ceiling_secs: 60.0,
            safety_buffer_ms: 500,
            tiers: vec![
                TimeTier { min_remaining_ms: 0, fraction: 1.0 / 60.0 },
                TimeTier { min_remaining_ms: 10_000, fraction: 1.0 / 40.0 },
                TimeTier { min_remaining_ms: 60_000, fraction: 1.0 / 30.0 },
                TimeTier { min_remaining_ms: 180_000, fraction: 1.0 / 25.0 },
            ],
            opening_moves: 8,
            opening_factor: 0.5,
            increment_fraction: 0.75,
        }
    }
}

impl TimePolicy {
    /// Think time in seconds for the side to move.
    pub fn allocate(&self, remaining_ms: u64, increment_secs: f64, move_number: u32) -> f64 {
        let floor = self.floor_secs;
        if remaining_ms == 0 {
            return floor;
        }

        let remaining_secs = remaining_ms as f64 / 1000.0;
        let mut think = remaining_secs * self.fraction_for(remaining_ms);
        if move_number <= self.opening_moves {
            think *= self.opening_factor;
        }
        think += increment_secs.max(0.0) * self.increment_fraction;

        let spendable = remaining_ms.saturating_sub(self.safety_buffer_ms) as f64 / 1000.0;
        let cap = self.ceiling_secs.min(spendable).max(floor);
        think.clamp(floor, cap)
    }

    fn fraction_for(&self, remaining_ms: u64) -> f64 {
        self.tiers
            .iter()
            .rev()
            .find(|tier| remaining_ms >= tier.min_remaining_ms)
            .map(|tier| tier.fraction)
            .unwrap_or(0.0)
    }

    /// Reject tables that would make the allocation shrink as time grows.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.floor_secs > 0.0) {
            return Err("floor must be positive".into());
        }
        if self.ceiling_secs < self.floor_secs {
            return Err("ceiling must not be below floor".into());
        }
        if !(self.increment_fraction > 0.0) {
            return Err("increment fraction must be positive".into());
        }
        if !(self.opening_factor > 0.0 && self.opening_factor <= 1.0) {
            return Err("opening factor must be in (0, 1]".into());
        }
        match self.tiers.first() {
            Some(tier) if tier.min_remaining_ms == 0 => {}
            _ => return Err("first tier must start at 0 ms".into()),
        }
        for pair in self.tiers.windows(2) {
            if pair[1].min_remaining_ms <= pair[0].min_remaining_ms {
                return Err("tier thresholds must be strictly ascending".into());
            }
            if pair[1].fraction < pair[0].fraction {
                return Err("tier fractions must not decrease with remaining time".into());
            }
        }
        if self.tiers.iter().any(|tier| !(tier.fraction > 0.0)) {
            return Err("tier fractions must be positive".into());
        }
        Ok(())
    }
}
