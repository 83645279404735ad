//! Settlement transaction-fee schedule.

use tbw_types::{Amount, FeeSettings};

/// Fee schedule derived from the broadcast provider's settings.
#[derive(Clone, Debug)]
pub struct FeeSchedule {
    single: Amount,
    multi_base: Amount,
    multi_per_payment: Amount,
    batch_limit: usize,
    request_limit: usize,
}

impl FeeSchedule {
    pub fn new(settings: &FeeSettings) -> Self {
        Self {
            single: Amount::new(settings.single),
            multi_base: Amount::new(settings.multi_base),
            multi_per_payment: Amount::new(settings.multi_per_payment),
            batch_limit: settings.batch_limit,
            request_limit: settings.request_limit,
        }
    }

    /// Fee for one single-recipient transfer.
    pub fn single(&self) -> Amount {
        self.single
    }

    /// Fee for one multi-recipient transaction with `legs` recipient legs.
    /// Zero legs means no transaction, so no fee.
    pub fn batch(&self, legs: usize) -> Amount {
        if legs == 0 {
            return Amount::ZERO;
        }
        self.multi_base + Amount::new(self.multi_per_payment.raw() * legs as u64)
    }

    /// Maximum recipient legs per multi-recipient transaction.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Maximum transactions per broadcast request.
    pub fn request_limit(&self) -> usize {
        self.request_limit
    }

    /// Total fee liability for settling `total_tx` payment rows.
    ///
    /// Batched: `floor(total/B)` full batches plus one partial batch of
    /// `total mod B` legs. Single: one transfer fee per row.
    pub fn settlement_fees(&self, total_tx: usize, batched: bool) -> Amount {
        if batched {
            let full = (total_tx / self.batch_limit) as u64;
            let partial = total_tx % self.batch_limit;
            Amount::new(full * self.batch(self.batch_limit).raw()) + self.batch(partial)
        } else {
            Amount::new(self.single.raw() * total_tx as u64)
        }
    }
}
