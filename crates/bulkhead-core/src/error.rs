//! Error types for the simulation API.
//!
//! Only [`SimError::IdSpaceExhausted`] is fatal. Everything else is reported
//! to the caller of an explicit operation and otherwise logged and ignored
//! while ticking.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// No ids left to hand out to new compartments, openings or walls
    #[error("entity id space exhausted ({limit} ids in use)")]
    IdSpaceExhausted { limit: u16 },

    #[error("unknown or despawned entity {0:?}")]
    UnknownEntity(hecs::Entity),

    #[error("wall section {section} out of range (wall has {count} sections)")]
    SectionOutOfRange { section: usize, count: usize },

    #[error("invalid value: {what}")]
    InvalidValue { what: &'static str },

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl SimError {
    /// True for errors the round cannot recover from
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::IdSpaceExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_id_exhaustion_is_fatal() {
        assert!(SimError::IdSpaceExhausted { limit: 4 }.is_fatal());
        assert!(!SimError::SectionOutOfRange { section: 9, count: 3 }.is_fatal());
        assert!(!SimError::InvalidValue { what: "dt" }.is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = SimError::SectionOutOfRange { section: 9, count: 3 };
        assert_eq!(err.to_string(), "wall section 9 out of range (wall has 3 sections)");
    }
}
