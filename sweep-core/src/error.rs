use crate::dom::DomError;

/// Failure of a single interaction primitive.
///
/// Propagates to the immediate caller (usually a per-child handler), which
/// decides whether to skip the child or abort.
#[derive(thiserror::Error, Debug)]
pub enum InteractionError {
    /// The node was detached from the document before the action ran.
    #[error("stale node: cannot {action} a detached element")]
    StaleNode { action: &'static str },

    /// The platform rejected the action.
    #[error("interaction failed: {0}")]
    Dom(DomError),
}

impl InteractionError {
    pub(crate) fn from_dom(action: &'static str, err: DomError) -> Self {
        match err {
            DomError::StaleNode => Self::StaleNode { action },
            other => Self::Dom(other),
        }
    }
}

/// Errors that terminate a traversal abnormally.
///
/// Setup failure and poll timeouts are outcomes, not errors: they are
/// reported through progress values and never appear here.
#[derive(thiserror::Error, Debug)]
pub enum TraversalError {
    /// An interaction primitive acted on a stale node and the handler let it through.
    #[error(transparent)]
    Interaction(#[from] InteractionError),

    /// `setup` or `next_child` met a platform state the hooks did not anticipate.
    #[error("structural assumption violated: {0}")]
    StructuralAssumption(String),

    /// A platform read failed.
    #[error("dom error: {0}")]
    Dom(#[from] DomError),

    /// A poll guard broke its invariants (zero interval, unterminated unbounded wait).
    #[error("invalid poll guard: {0}")]
    InvalidGuard(String),

    /// Caller-defined hook failure.
    #[error("hook failed: {0}")]
    Hook(#[from] anyhow::Error),
}

impl TraversalError {
    /// Shorthand for [`TraversalError::StructuralAssumption`].
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::StructuralAssumption(msg.into())
    }
}
