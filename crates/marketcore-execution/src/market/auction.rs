//! Trading-mode bookkeeping: which auction a market is in and when it ends.

use chrono::{DateTime, Duration, Utc};
use marketcore_types::TradingMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionState {
    mode: TradingMode,
    /// Mode to return to when a governance suspension is lifted.
    suspended_from: Option<TradingMode>,
    end: Option<DateTime<Utc>>,
}

impl Default for AuctionState {
    fn default() -> Self {
        Self {
            mode: TradingMode::NoTrading,
            suspended_from: None,
            end: None,
        }
    }
}

impl AuctionState {
    #[must_use]
    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    #[must_use]
    pub fn in_auction(&self) -> bool {
        self.mode.is_auction()
    }

    #[must_use]
    pub fn is_opening(&self) -> bool {
        self.mode == TradingMode::OpeningAuction
    }

    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Opening auction from `start`, ending no earlier than `min_end`.
    pub fn start_opening(&mut self, start: DateTime<Utc>, length: Duration, min_end: DateTime<Utc>) {
        self.mode = TradingMode::OpeningAuction;
        self.end = Some((start + length).max(min_end));
    }

    pub fn start_monitoring(&mut self, now: DateTime<Utc>, length: Duration) {
        self.mode = TradingMode::MonitoringAuction;
        self.end = Some(now + length);
    }

    /// Governance suspension has no scheduled end of its own; a timed
    /// auction it interrupts keeps its end for when trading resumes.
    pub fn suspend(&mut self) {
        if self.mode != TradingMode::SuspendedViaGovernance {
            self.suspended_from = Some(self.mode);
        }
        self.mode = TradingMode::SuspendedViaGovernance;
    }

    /// Lifts a governance suspension. Returns the mode the market was in
    /// before, or `None` if it was not suspended.
    pub fn resume(&mut self) -> Option<TradingMode> {
        if self.mode != TradingMode::SuspendedViaGovernance {
            return None;
        }
        let previous = self.suspended_from.take().unwrap_or(TradingMode::Continuous);
        self.mode = previous;
        Some(previous)
    }

    /// Whether a timed auction has run its course.
    #[must_use]
    pub fn can_end(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.mode,
            TradingMode::OpeningAuction | TradingMode::MonitoringAuction
        ) && self.end.is_some_and(|end| now >= end)
    }

    /// Extends a timed auction so it lasts at least `min_end`.
    pub fn extend_to(&mut self, min_end: DateTime<Utc>) {
        if let Some(end) = self.end {
            self.end = Some(end.max(min_end));
        }
    }

    pub fn set_continuous(&mut self) {
        self.mode = TradingMode::Continuous;
        self.end = None;
    }

    pub fn stop(&mut self) {
        self.mode = TradingMode::NoTrading;
        self.suspended_from = None;
        self.end = None;
    }
}
