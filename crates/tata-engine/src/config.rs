//! Engine configuration

use crate::error::{Error, Result};

/// Metadata fields checked for agenda text on terminal events, in priority order
pub const DEFAULT_AGENDA_FIELDS: [&str; 4] = ["agenda_doc", "updated_agenda_doc", "agenda", "final_agenda"];

/// Tunables for the session state engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Content characters included in an event fingerprint
    pub fingerprint_prefix_chars: usize,
    /// Maximum diagnostic entries kept; oldest are dropped first
    pub max_diagnostics: usize,
    /// Content characters shown in diagnostic previews
    pub preview_chars: usize,
    /// Metadata fields that may carry agenda text, first present wins
    pub agenda_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fingerprint_prefix_chars: 50,
            max_diagnostics: 500,
            preview_chars: 50,
            agenda_fields: DEFAULT_AGENDA_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine can't work with
    pub fn validate(&self) -> Result<()> {
        if self.fingerprint_prefix_chars == 0 {
            return Err(Error::Config(
                "fingerprint_prefix_chars must be at least 1".to_string(),
            ));
        }
        if self.max_diagnostics == 0 {
            return Err(Error::Config("max_diagnostics must be at least 1".to_string()));
        }
        if self.agenda_fields.is_empty() {
            return Err(Error::Config("agenda_fields must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_agenda_priority() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.agenda_fields[0], "agenda_doc");
        assert_eq!(cfg.agenda_fields[3], "final_agenda");
    }

    #[test]
    fn test_zero_prefix_rejected() {
        let cfg = EngineConfig {
            fingerprint_prefix_chars: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
