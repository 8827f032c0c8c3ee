use ulid::Ulid;

use super::placement::RejectReason;
use super::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    OutsideBusinessHours,
    ConflictsWith(Vec<Ulid>),
    InvalidResourceOrTime,
    ImmovableAppointment {
        id: Ulid,
        reason: &'static str,
    },
    InvalidStateTransition {
        state: SessionState,
        op: &'static str,
        reason: &'static str,
    },
    StoreRejected(String),
}

impl SchedulingError {
    /// Store rejections mean the caller's snapshot is stale and must be re-fetched
    /// before retrying. Everything else can be retried against the same snapshot.
    pub fn requires_refetch(&self) -> bool {
        matches!(self, SchedulingError::StoreRejected(_))
    }
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::OutsideBusinessHours => write!(f, "outside business hours"),
            SchedulingError::ConflictsWith(ids) => {
                write!(f, "conflicts with {} appointment(s): ", ids.len())?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                Ok(())
            }
            SchedulingError::InvalidResourceOrTime => write!(f, "invalid resource or time"),
            SchedulingError::ImmovableAppointment { id, reason } => {
                write!(f, "appointment {id} cannot be moved: {reason}")
            }
            SchedulingError::InvalidStateTransition { state, op, reason } => {
                write!(f, "cannot {op} relocation session ({state}): {reason}")
            }
            SchedulingError::StoreRejected(reason) => {
                write!(f, "booking store rejected reschedule: {reason}")
            }
        }
    }
}

impl std::error::Error for SchedulingError {}

impl From<RejectReason> for SchedulingError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::OutsideBusinessHours => SchedulingError::OutsideBusinessHours,
            RejectReason::ConflictsWith(ids) => SchedulingError::ConflictsWith(ids),
            RejectReason::InvalidResourceOrTime => SchedulingError::InvalidResourceOrTime,
        }
    }
}
