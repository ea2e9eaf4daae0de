//! Execution status enum and its state machine.
//!
//! Each variant's discriminant matches the seed data order (1-based) of the
//! `execution_statuses` lookup table.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Lowercase name, as stored in the lookup table.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle status of a single execution.
    ExecutionStatus {
        Pending = 1 => "pending",
        Running = 2 => "running",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        Cancelled = 5 => "cancelled",
        Retrying = 6 => "retrying",
    }
}

impl ExecutionStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether an explicit cancellation request may act on this status.
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Retrying)
    }

    /// Statuses reachable from `self`.
    ///
    /// `Retrying -> Retrying` covers a re-dispatch that fails again before
    /// reaching the remote engine.
    pub fn valid_transitions(self) -> &'static [ExecutionStatus] {
        use ExecutionStatus::*;
        match self {
            Pending => &[Running, Retrying, Failed, Cancelled],
            Running => &[Completed, Retrying, Failed, Cancelled],
            Retrying => &[Running, Retrying, Failed, Cancelled],
            Completed | Failed | Cancelled => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: ExecutionStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a descriptive message for invalid ones.
    pub fn validate_transition(self, to: ExecutionStatus) -> Result<(), String> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {self} -> {to}"))
        }
    }
}
