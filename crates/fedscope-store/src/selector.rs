//! Client/loader selection state for distribution views.

use fedscope_protocol::{DistributionMap, LoaderDistribution};

/// Outcome of resolving the current selection against a distribution map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// No client or no loader is selected.
    None,
    /// Both ids are selected but the map holds no entry for the pair.
    Missing,
    /// The selected entry.
    Entry(&'a LoaderDistribution),
}

/// Tracks which client and loader the operator is looking at.
///
/// Pure selection state over an externally supplied map. Reselecting a
/// client resets the loader to that client's first available loader id in
/// map order, or to no selection if it has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionSelector {
    client: Option<String>,
    loader: Option<String>,
}

impl DistributionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn loader(&self) -> Option<&str> {
        self.loader.as_deref()
    }

    /// Select a client, resetting the loader selection.
    pub fn select_client(&mut self, distributions: &DistributionMap, client: impl Into<String>) {
        let client = client.into();
        self.loader = distributions
            .get(&client)
            .and_then(|loaders| loaders.keys().next().cloned());
        self.client = Some(client);
    }

    /// Select a loader for the current client.
    pub fn select_loader(&mut self, loader: impl Into<String>) {
        self.loader = Some(loader.into());
    }

    /// Drop both selections.
    pub fn clear(&mut self) {
        self.client = None;
        self.loader = None;
    }

    /// Resolve the current selection against `distributions`.
    ///
    /// A pair that is selected but absent resolves to [`Selection::Missing`],
    /// never an error.
    pub fn current<'a>(&self, distributions: &'a DistributionMap) -> Selection<'a> {
        let (Some(client), Some(loader)) = (self.client.as_deref(), self.loader.as_deref()) else {
            return Selection::None;
        };
        match distributions
            .get(client)
            .and_then(|loaders| loaders.get(loader))
        {
            Some(entry) => Selection::Entry(entry),
            None => Selection::Missing,
        }
    }

    /// Loader ids available for the current client, in map order.
    pub fn loader_ids<'a>(&self, distributions: &'a DistributionMap) -> Vec<&'a str> {
        self.client
            .as_deref()
            .and_then(|client| distributions.get(client))
            .map(|loaders| loaders.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}
