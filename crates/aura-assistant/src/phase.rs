//! UI Phase Controller
//!
//! Holds the single screen the user is on. Transitions are driven by
//! resolver output and explicit user actions; re-entering the current phase
//! is a no-op and reports no transition.

use serde::{Deserialize, Serialize};

use crate::resolver::Resolution;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiPhase {
    #[default]
    Entry,
    ViewingData,
    AwaitingTradeConfirmation,
}

impl UiPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::ViewingData => "viewing_data",
            Self::AwaitingTradeConfirmation => "awaiting_trade_confirmation",
        }
    }

    /// Phase implied by the derived data alone. A receipt always wins.
    pub const fn implied(chart_active: bool, receipt_active: bool) -> Self {
        if receipt_active {
            Self::AwaitingTradeConfirmation
        } else if chart_active {
            Self::ViewingData
        } else {
            Self::Entry
        }
    }
}

impl std::fmt::Display for UiPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: UiPhase,
    pub to: UiPhase,
}

#[derive(Debug, Default)]
pub struct PhaseController {
    phase: UiPhase,
}

impl PhaseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn phase(&self) -> UiPhase {
        self.phase
    }

    /// React to a resolver pass. Only values that actually changed can move
    /// the phase, so re-observing the same chart never re-enters `ViewingData`.
    pub fn on_resolution(
        &mut self,
        resolution: Resolution,
        chart_active: bool,
        receipt_active: bool,
    ) -> Option<PhaseTransition> {
        if resolution.receipt_changed && receipt_active {
            self.enter(UiPhase::AwaitingTradeConfirmation)
        } else if resolution.chart_changed && chart_active && !receipt_active {
            self.enter(UiPhase::ViewingData)
        } else {
            None
        }
    }

    /// Fall back to whatever the remaining data implies, after the user
    /// dismissed a chart or receipt
    pub fn settle(&mut self, chart_active: bool, receipt_active: bool) -> Option<PhaseTransition> {
        self.enter(UiPhase::implied(chart_active, receipt_active))
    }

    pub fn reset(&mut self) -> Option<PhaseTransition> {
        self.enter(UiPhase::Entry)
    }

    fn enter(&mut self, to: UiPhase) -> Option<PhaseTransition> {
        if self.phase == to {
            return None;
        }
        let from = std::mem::replace(&mut self.phase, to);
        tracing::info!(%from, %to, "Phase transition");
        Some(PhaseTransition { from, to })
    }
}
