use crate::config::ChainSettings;
use crate::error::{BlockchainError, Result};
use log::info;

/// Difficulty retuning from observed mining times
///
/// Every `adjust_every_blocks` blocks the average mining duration of the most
/// recent window is compared against the target. Too fast moves difficulty up
/// one step, too slow moves it down one step, anything within the tolerance
/// band leaves it alone.
#[derive(Debug, Clone)]
pub struct DifficultyAdjustment {
    target_block_time_ms: u64,
    adjust_every_blocks: u64,
    tolerance: f64,
    min_difficulty: u32,
    max_difficulty: u32,
}

impl DifficultyAdjustment {
    pub fn from_settings(settings: &ChainSettings) -> DifficultyAdjustment {
        DifficultyAdjustment {
            target_block_time_ms: settings.target_block_time_ms,
            adjust_every_blocks: settings.adjust_every_blocks.max(1),
            tolerance: settings.tolerance,
            min_difficulty: settings.min_difficulty,
            max_difficulty: settings.max_difficulty,
        }
    }

    /// Adjustment only happens at exact multiples of the window, never before the first one
    pub fn is_adjustment_point(&self, block_count: u64) -> bool {
        block_count >= self.adjust_every_blocks && block_count % self.adjust_every_blocks == 0
    }

    /// Difficulty for the next block
    ///
    /// `block_count` includes the block that was just mined and
    /// `recent_durations_ms` holds the non-genesis window ending with it.
    pub fn calculate_next_difficulty(
        &self,
        current_difficulty: u32,
        block_count: u64,
        recent_durations_ms: &[u64],
    ) -> u32 {
        if !self.is_adjustment_point(block_count) {
            return current_difficulty;
        }
        let Some(average) = Self::average_duration_ms(recent_durations_ms) else {
            return current_difficulty;
        };

        let target = self.target_block_time_ms as f64;
        let lower = target * (1.0 - self.tolerance);
        let upper = target * (1.0 + self.tolerance);

        let next = if average < lower {
            current_difficulty.saturating_add(1)
        } else if average > upper && current_difficulty > 1 {
            current_difficulty - 1
        } else {
            current_difficulty
        };
        let next = self.clamp(next);

        info!("Difficulty check at block count {block_count}: {current_difficulty} -> {next} (average: {average:.0}ms, target: {}ms)", self.target_block_time_ms);
        next
    }

    pub fn average_duration_ms(durations: &[u64]) -> Option<f64> {
        if durations.is_empty() {
            return None;
        }
        let total: u128 = durations.iter().map(|d| *d as u128).sum();
        Some(total as f64 / durations.len() as f64)
    }

    pub fn clamp(&self, difficulty: u32) -> u32 {
        difficulty.clamp(self.min_difficulty, self.max_difficulty)
    }

    pub fn validate_difficulty(&self, difficulty: u32) -> Result<()> {
        if !(self.min_difficulty..=self.max_difficulty).contains(&difficulty) {
            return Err(BlockchainError::Mining(format!(
                "Difficulty {difficulty} is outside valid range [{}, {}]",
                self.min_difficulty, self.max_difficulty
            )));
        }
        Ok(())
    }

    pub fn get_adjustment_period(&self) -> u64 {
        self.adjust_every_blocks
    }

    pub fn get_target_block_time(&self) -> u64 {
        self.target_block_time_ms
    }
}
