//! Trading decisions handed to the core by the strategy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::PositionSide;

/// Action chosen by the strategy for one market on one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Hold,
    /// Enter an Up position.
    OpenLong,
    /// Enter a Down position.
    OpenShort,
    /// Exit the open position.
    Close,
}

/// A strategy decision with an optional size multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default = "default_multiplier")]
    pub size_multiplier: Decimal,
    /// Exit by crossing the book instead of resting a limit order.
    #[serde(default)]
    pub urgent: bool,
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

impl Decision {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            size_multiplier: Decimal::ONE,
            urgent: false,
        }
    }

    pub fn hold() -> Self {
        Self::new(Action::Hold)
    }

    pub fn open_long() -> Self {
        Self::new(Action::OpenLong)
    }

    pub fn open_short() -> Self {
        Self::new(Action::OpenShort)
    }

    pub fn close() -> Self {
        Self::new(Action::Close)
    }

    /// Close with a fill-or-kill order at a marketable price.
    pub fn exit_now() -> Self {
        Self {
            urgent: true,
            ..Self::close()
        }
    }

    pub fn with_multiplier(mut self, size_multiplier: Decimal) -> Self {
        self.size_multiplier = size_multiplier;
        self
    }

    /// Side of the position an open decision would create.
    pub fn open_side(&self) -> Option<PositionSide> {
        match self.action {
            Action::OpenLong => Some(PositionSide::Up),
            Action::OpenShort => Some(PositionSide::Down),
            Action::Hold | Action::Close => None,
        }
    }
}
