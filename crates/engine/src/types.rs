use fxhash::FxHashMap;

/// Identifier of a node or relationship table.
pub type TableId = u64;

/// Dense, per-table node or relationship offset.
pub type Offset = u64;

pub const INVALID_OFFSET: Offset = u64::MAX;

/// Map keyed by table id. Keys are finite and fixed at invocation start.
pub type TableMap<T> = FxHashMap<TableId, T>;

/// Internal node identifier: a dense offset within a node table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub offset: Offset,
    pub table: TableId,
}

impl NodeId {
    pub fn new(offset: Offset, table: TableId) -> Self {
        Self { offset, table }
    }
}

/// Internal relationship identifier. Opaque to the engine; only echoed
/// back in path outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelId {
    pub offset: Offset,
    pub table: TableId,
}

impl RelId {
    pub fn new(offset: Offset, table: TableId) -> Self {
        Self { offset, table }
    }
}

/// Direction of an extension step relative to the relationship tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Fwd,
    Bwd,
    Both,
}
