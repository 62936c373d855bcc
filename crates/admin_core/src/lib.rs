//! Admin-mode core of the storefront: the hidden unlock gesture and the
//! drag-and-drop reorder protocol. Both are independent of any transport;
//! hosts feed them taps and list moves and react to their signals.

pub mod gesture;
pub mod reorder;

pub use gesture::{
    Expiry, GestureConfig, GestureDetector, GesturePhase, TapOutcome, TapSequence,
};
pub use reorder::{
    plan_move, reorder, MovePlan, OrderedItem, PositionStore, PositionWrite, RefreshSignal,
    ReorderCoordinator, ReorderError, ReorderOutcome, ReorderReport,
};
