pub mod object_store;
pub mod report;
pub mod warehouse;

/// What a sink accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Record batches bound for a named table.
    Rows,
    /// Named binary objects.
    Files,
}
