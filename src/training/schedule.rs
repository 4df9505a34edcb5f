//! Pool-Driven Training Schedule
//!
//! The learning rate is staged by "epoch", where an epoch is measured against
//! the target pool size (`cap`) rather than the full train set: while the
//! pool is still growing, the same number of steps sweeps the pool more
//! often, which is the intended behavior. Also computes how many training
//! steps to run between pool growth rounds.

use tracing::info;

use crate::config::ScheduleConfig;
use crate::utils::error::Result;

/// Staged learning-rate setter with epoch boundaries fixed up front
#[derive(Debug, Clone)]
pub struct FixedScheduleSetter {
    config: ScheduleConfig,
    /// Initial rate followed by the scheduled rates, one per stage
    all_learning_rates: Vec<f64>,
    /// One flag per stage so each transition is logged exactly once
    notified: Vec<bool>,
}

impl FixedScheduleSetter {
    pub fn new(config: ScheduleConfig) -> Result<Self> {
        config.validate()?;

        let mut all_learning_rates = vec![config.initial_learning_rate];
        all_learning_rates.extend(&config.scheduled_learning_rates);
        let notified = vec![false; all_learning_rates.len()];

        Ok(Self {
            config,
            all_learning_rates,
            notified,
        })
    }

    /// Epoch for a global step, measured against the pool cap
    pub fn epoch_for_step(&self, global_step: usize) -> usize {
        self.config.train_batch_size * global_step / self.config.cap
    }

    /// Learning rate for a global step; logs each stage transition once
    pub fn lr_for_step(&mut self, global_step: usize) -> f64 {
        let epoch = self.epoch_for_step(global_step);

        for (i, &boundary) in self.config.scheduled_epochs.iter().enumerate() {
            if epoch < boundary {
                self.notify(i, epoch);
                return self.all_learning_rates[i];
            }
        }

        let last = self.all_learning_rates.len() - 1;
        self.notify(last, epoch);
        self.all_learning_rates[last]
    }

    fn notify(&mut self, stage: usize, epoch: usize) {
        if !self.notified[stage] {
            info!(
                "epoch={}. setting learning rate to {}",
                epoch, self.all_learning_rates[stage]
            );
            self.notified[stage] = true;
        }
    }

    /// Training steps to run before the next pool growth round:
    /// `active_epochs` sweeps over the current pool
    pub fn steps_for_pool(&self, pool_size: usize) -> usize {
        (self.config.active_epochs as f64 * pool_size as f64
            / self.config.train_batch_size as f64)
            .round() as usize
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn description(&self) -> String {
        format!(
            "fixed schedule: rates {:?} at epochs {:?}, cap {}, {} epochs per pool round",
            self.all_learning_rates,
            self.config.scheduled_epochs,
            self.config.cap,
            self.config.active_epochs
        )
    }
}
