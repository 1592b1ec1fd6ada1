// ============================================================
// Layer 5: Early Stopping
// ============================================================
// Tracks the best mean validation loss seen so far. Every epoch
// that does not beat it is "stale"; `patience` consecutive stale
// epochs end training.
//
//   patience = 2
//   val_loss: 3.1  2.8  2.9  3.0   → stop after epoch 4
//             best best stale stale

/// What the trainer should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpochVerdict {
    /// New best validation loss
    Improved,
    /// No improvement yet, `stale` consecutive epochs so far
    Stale { stale: usize },
    /// Patience exhausted
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:     usize,
    best:         f64,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: f64::INFINITY, stale_epochs: 0 }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Record one epoch's mean validation loss. NaN never improves.
    pub fn observe(&mut self, val_loss: f64) -> EpochVerdict {
        if val_loss < self.best {
            self.best         = val_loss;
            self.stale_epochs = 0;
            return EpochVerdict::Improved;
        }

        self.stale_epochs += 1;
        if self.stale_epochs >= self.patience {
            EpochVerdict::Stop
        } else {
            EpochVerdict::Stale { stale: self.stale_epochs }
        }
    }
}
