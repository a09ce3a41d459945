/// Represents which UI component has focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
    Logs,
    Metrics,
    Inspect,
}

/// Where key presses go
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputMode {
    Normal,
    /// Editing the search text; holds the draft.
    Search(String),
}
