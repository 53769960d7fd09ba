use biofilm_common::{Coord, Direction};

/// Fatal conditions raised by the engine.
///
/// None of these are retried; the driver reports them and terminates.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EngineError {
    /// Over-capacity cell enclosed by Solid/Wall/Pore on every side.
    #[error("no receiving neighbor for over-capacity cell {cell} (excess {excess:.6e})")]
    NoReceivingNeighbor { cell: Coord, excess: f64 },
    /// The push/pull loop kept finding over-capacity cells.
    #[error("push/pull loop exceeded {limit} sweeps (max excess {max_excess:.6e} at {cell})")]
    SweepLimitExceeded { limit: u32, max_excess: f64, cell: Coord },
    /// The front-age fixed point did not settle.
    #[error("front-age refresh did not stabilise within {limit} iterations")]
    AgeRefreshLimitExceeded { limit: u32 },
    /// A pore cell crossed the biofilm threshold without any contributing species.
    #[error("cannot determine a biofilm type for cell {cell} (total {total:.6e})")]
    BiofilmTypeUndetermined { cell: Coord, total: f64 },
    /// A relayed transfer pointed at a cell the receiving worker does not own.
    #[error("transfer from {from} toward {direction:?} does not land in worker {worker}")]
    MisroutedTransfer { from: Coord, direction: Direction, worker: usize },
    #[error("invalid decomposition: {0}")]
    InvalidDecomposition(String),
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),
}
