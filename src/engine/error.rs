use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    /// No occasion stored for this date on the addressed restaurant.
    OccasionNotFound(NaiveDate),
    AlreadyExists(Ulid),
    /// Slot index outside `0..64`.
    InvalidSlot(i64),
    /// The requested date/slot is not open per template + occasions.
    SlotClosed { date: NaiveDate, slot: u8 },
    PartySizeRejected { given: u32, max: u32 },
    /// Slot is open but all seats for it are taken.
    CapacityExceeded(u32),
    /// Stored template does not have exactly seven weekday masks.
    InvalidTemplate(usize),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::OccasionNotFound(date) => write!(f, "no occasion on {date}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidSlot(slot) => {
                write!(f, "slot index {slot} outside representable range")
            }
            EngineError::SlotClosed { date, slot } => {
                write!(f, "slot {slot} on {date} is not open for booking")
            }
            EngineError::PartySizeRejected { given, max } => {
                write!(f, "party size {given} outside allowed range [1, {max}]")
            }
            EngineError::CapacityExceeded(cap) => {
                write!(f, "capacity {cap} exceeded: slot fully booked")
            }
            EngineError::InvalidTemplate(n) => {
                write!(f, "template has {n} weekday masks, expected 7")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
