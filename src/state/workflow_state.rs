/// Workflow state definitions for tracking crawl and validation runs
///
/// Each top-level workflow (one catalog crawl, one catalog validation) moves
/// through these states. Once the workflow's report exists the state is
/// persisted on it.
use crate::ProbeError;
use std::fmt;

/// Represents the current state of a crawl or validation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    // ===== Active States =====
    /// Workflow accepted, nothing fetched yet
    Started,

    /// The catalog document was fetched with a usable response
    CatalogFetched,

    /// The catalog bytes decoded into JSON
    CatalogParsed,

    /// Check descriptors were built from the catalog items
    ItemsExtracted,

    /// Every check task was submitted to the queue
    ChecksDispatched,

    /// The catalog was checked against the schema
    CatalogValidated,

    // ===== Terminal States =====
    /// The report is persisted; dispatched checks progress on their own
    Completed,

    /// The catalog could not be fetched or decoded
    FailedNoCatalog,
}

impl WorkflowState {
    /// Returns true if no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedNoCatalog)
    }

    /// Returns true if the workflow ended without a usable catalog
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedNoCatalog)
    }

    /// Checks whether moving from this state to `next` is allowed
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Started, CatalogFetched)
                | (Started, FailedNoCatalog)
                | (CatalogFetched, CatalogParsed)
                | (CatalogFetched, FailedNoCatalog)
                | (CatalogParsed, ItemsExtracted)
                | (CatalogParsed, CatalogValidated)
                | (CatalogParsed, FailedNoCatalog)
                | (ItemsExtracted, ChecksDispatched)
                | (ChecksDispatched, Completed)
                | (CatalogValidated, Completed)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::CatalogFetched => "catalog_fetched",
            Self::CatalogParsed => "catalog_parsed",
            Self::ItemsExtracted => "items_extracted",
            Self::ChecksDispatched => "checks_dispatched",
            Self::CatalogValidated => "catalog_validated",
            Self::Completed => "completed",
            Self::FailedNoCatalog => "failed_no_catalog",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "catalog_fetched" => Some(Self::CatalogFetched),
            "catalog_parsed" => Some(Self::CatalogParsed),
            "items_extracted" => Some(Self::ItemsExtracted),
            "checks_dispatched" => Some(Self::ChecksDispatched),
            "catalog_validated" => Some(Self::CatalogValidated),
            "completed" => Some(Self::Completed),
            "failed_no_catalog" => Some(Self::FailedNoCatalog),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Progress of a single URL check task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    Dispatched,
    Fetched,
    Persisted,
}

impl CheckState {
    /// Checks only move forward, one step at a time
    pub fn can_transition_to(&self, next: CheckState) -> bool {
        matches!(
            (self, next),
            (Self::Dispatched, Self::Fetched) | (Self::Fetched, Self::Persisted)
        )
    }

    /// Moves a check to `next`, logging the step for `url`
    pub fn advance(self, next: CheckState, url: &str) -> Result<CheckState, ProbeError> {
        if !self.can_transition_to(next) {
            return Err(ProbeError::InvalidCheckTransition { from: self, to: next });
        }
        tracing::debug!("{}: {} -> {}", url, self, next);
        Ok(next)
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dispatched => "dispatched",
            Self::Fetched => "fetched",
            Self::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// In-memory tracker for one workflow run
///
/// The report does not exist for the first few states, so the tracker holds
/// the state until there is somewhere to persist it.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: &'static str,
    state: WorkflowState,
}

impl Workflow {
    pub fn start(name: &'static str) -> Self {
        tracing::debug!("{}: {}", name, WorkflowState::Started);
        Self {
            name,
            state: WorkflowState::Started,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: WorkflowState) -> Result<WorkflowState, ProbeError> {
        if !self.state.can_transition_to(next) {
            return Err(ProbeError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("{}: {} -> {}", self.name, self.state, next);
        self.state = next;
        Ok(next)
    }
}
