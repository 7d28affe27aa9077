//! Upstream device setup that has to be in place before a pipeline is built.
//!
//! Deciding which profile a card needs is left to the caller; this only
//! re-applies decisions already made.

use fanoutconf::CardProfile;
use tracing::{info, warn};

use crate::server::ModuleControl;

pub trait Prerequisites: Send + Sync {
    /// Best effort. Errors are logged by the reconciler and never abort apply.
    fn ensure(&self, control: &ModuleControl) -> anyhow::Result<()>;
}

/// Nothing to prepare.
pub struct NoPrerequisites;

impl Prerequisites for NoPrerequisites {
    fn ensure(&self, _control: &ModuleControl) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Switches each listed card to its profile.
pub struct CardProfiles {
    profiles: Vec<CardProfile>,
}

impl CardProfiles {
    pub fn new(profiles: Vec<CardProfile>) -> Self {
        Self { profiles }
    }
}

impl Prerequisites for CardProfiles {
    fn ensure(&self, control: &ModuleControl) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for p in &self.profiles {
            match control.set_card_profile(&p.card, &p.profile) {
                Ok(()) => info!(card = %p.card, profile = %p.profile, "card profile set"),
                Err(e) => {
                    warn!(card = %p.card, error = %e, "card profile not set");
                    failed.push(p.card.clone());
                }
            }
        }
        if !failed.is_empty() {
            anyhow::bail!("could not set profile on {}", failed.join(", "));
        }
        Ok(())
    }
}
