//! Low-frequency identity self-check for observed combatants

/// Steps between identity checks
pub const IDENTITY_CHECK_PERIOD: u32 = 15;

/// Locally displayed identity of a combatant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub display_name: Option<String>,
    pub color_index: Option<u8>,
}

impl Identity {
    pub fn is_populated(&self) -> bool {
        self.display_name
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
            && self.color_index.is_some()
    }
}

/// Scheduled corrective check. Fires on the first step and then every `period` steps.
#[derive(Debug, Clone)]
pub struct IdentityAudit {
    period: u32,
    counter: u32,
}

impl IdentityAudit {
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            counter: 0,
        }
    }

    /// Advance one step; true when a check is due on this step
    pub fn tick(&mut self) -> bool {
        let due = self.counter == 0;
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
        }
        due
    }

    /// Advance one step and report whether a rebroadcast should be requested
    pub fn needs_repair(&mut self, identity: &Identity) -> bool {
        self.tick() && !identity.is_populated()
    }
}

impl Default for IdentityAudit {
    fn default() -> Self {
        Self::new(IDENTITY_CHECK_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_every_period() {
        let mut audit = IdentityAudit::new(15);
        let due: Vec<usize> = (0..46).filter(|_| audit.tick()).collect();
        assert_eq!(due.len(), 4);

        let mut audit = IdentityAudit::new(15);
        let steps: Vec<bool> = (0..31).map(|_| audit.tick()).collect();
        assert!(steps[0]);
        assert!(steps[15]);
        assert!(steps[30]);
        assert_eq!(steps.iter().filter(|d| **d).count(), 3);
    }

    #[test]
    fn populated_identity_never_requests() {
        let identity = Identity {
            display_name: Some("Ace".into()),
            color_index: Some(2),
        };
        let mut audit = IdentityAudit::default();
        assert!((0..60).all(|_| !audit.needs_repair(&identity)));
    }

    #[test]
    fn missing_color_requests_on_schedule() {
        let identity = Identity {
            display_name: Some("Ace".into()),
            color_index: None,
        };
        let mut audit = IdentityAudit::default();
        let requests = (0..30).filter(|_| audit.needs_repair(&identity)).count();
        assert_eq!(requests, 2);
    }

    #[test]
    fn blank_name_is_not_populated() {
        let identity = Identity {
            display_name: Some("  ".into()),
            color_index: Some(0),
        };
        assert!(!identity.is_populated());
    }
}
