use std::collections::BTreeSet;

use crate::catalog::ModuleListing;
use crate::types::{ModuleBlock, ModuleId};

/// Finds loaded modules by substrings of their descriptor text.
pub struct ModuleLocator {
    listing: ModuleListing,
}

impl ModuleLocator {
    pub fn new(listing: ModuleListing) -> Self {
        Self { listing }
    }

    /// Ids of every module whose descriptor contains all of `predicates`.
    pub fn find_matching_module_ids(&self, predicates: &[String]) -> BTreeSet<ModuleId> {
        matching_ids(self.listing.iter(), predicates)
    }
}

/// Case-sensitive, ANDed substring match. An empty predicate list matches
/// nothing rather than everything.
pub fn matching_ids<I>(blocks: I, predicates: &[String]) -> BTreeSet<ModuleId>
where
    I: IntoIterator<Item = ModuleBlock>,
{
    if predicates.is_empty() {
        return BTreeSet::new();
    }

    blocks
        .into_iter()
        .filter(|block| predicates.iter().all(|p| block.text.contains(p.as_str())))
        .map(|block| block.id)
        .collect()
}
