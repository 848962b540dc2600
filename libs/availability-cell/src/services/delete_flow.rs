use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::AvailabilityError;

/// Deleting a window is a two-step action: it has to be requested and then
/// confirmed before the store is touched.
///
/// ```text
/// Idle --request--> PendingConfirmation --confirm--> Confirmed --complete--> Completed
///                          |
///                          +--cancel--> Idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeleteFlow {
    #[default]
    Idle,
    PendingConfirmation { window_id: Uuid },
    Confirmed { window_id: Uuid },
    Completed { window_id: Uuid },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Cannot {action} a deletion that is {state}")]
pub struct InvalidTransition {
    pub action: &'static str,
    pub state: &'static str,
}

impl From<InvalidTransition> for AvailabilityError {
    fn from(err: InvalidTransition) -> Self {
        AvailabilityError::Validation(err.to_string())
    }
}

impl DeleteFlow {
    pub fn request(self, window_id: Uuid) -> Result<Self, InvalidTransition> {
        match self {
            DeleteFlow::Idle | DeleteFlow::Completed { .. } => {
                Ok(DeleteFlow::PendingConfirmation { window_id })
            }
            other => Err(other.invalid("request")),
        }
    }

    pub fn confirm(self) -> Result<Self, InvalidTransition> {
        match self {
            DeleteFlow::PendingConfirmation { window_id } => Ok(DeleteFlow::Confirmed { window_id }),
            other => Err(other.invalid("confirm")),
        }
    }

    pub fn cancel(self) -> Result<Self, InvalidTransition> {
        match self {
            DeleteFlow::PendingConfirmation { .. } => Ok(DeleteFlow::Idle),
            other => Err(other.invalid("cancel")),
        }
    }

    pub fn complete(self) -> Result<Self, InvalidTransition> {
        match self {
            DeleteFlow::Confirmed { window_id } => Ok(DeleteFlow::Completed { window_id }),
            other => Err(other.invalid("complete")),
        }
    }

    pub fn window_id(&self) -> Option<Uuid> {
        match self {
            DeleteFlow::Idle => None,
            DeleteFlow::PendingConfirmation { window_id }
            | DeleteFlow::Confirmed { window_id }
            | DeleteFlow::Completed { window_id } => Some(*window_id),
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            DeleteFlow::Idle => "idle",
            DeleteFlow::PendingConfirmation { .. } => "pending confirmation",
            DeleteFlow::Confirmed { .. } => "confirmed",
            DeleteFlow::Completed { .. } => "completed",
        }
    }

    fn invalid(self, action: &'static str) -> InvalidTransition {
        InvalidTransition {
            action,
            state: self.state_name(),
        }
    }
}
