use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use shared::domain::{Collection, Product, ProductId, Testimonial, TestimonialId};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A collection member whose display order is its `position`.
///
/// Everything except the id and position is opaque to the reorder logic.
pub trait OrderedItem: Send + Sync {
    type Id: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    const COLLECTION: Collection;

    fn id(&self) -> Self::Id;
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
}

impl OrderedItem for Product {
    type Id = ProductId;

    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> ProductId {
        self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

impl OrderedItem for Testimonial {
    type Id = TestimonialId;

    const COLLECTION: Collection = Collection::Testimonials;

    fn id(&self) -> TestimonialId {
        self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Persists a single item's position. Implementations give per-item
/// atomicity at most; nothing spans several calls.
#[async_trait]
pub trait PositionStore<Id: Send + 'static>: Send + Sync {
    async fn set_position(&self, id: Id, position: u32) -> Result<()>;
}

#[async_trait]
impl<Id, S> PositionStore<Id> for Arc<S>
where
    Id: Send + 'static,
    S: PositionStore<Id> + ?Sized,
{
    async fn set_position(&self, id: Id, position: u32) -> Result<()> {
        (**self).set_position(id, position).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("index {index} is out of range for a list of {len} items")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionWrite<Id> {
    pub id: Id,
    pub position: u32,
}

#[derive(Debug, Clone)]
pub struct MovePlan<T: OrderedItem> {
    /// The list after the move, renumbered `0..len`.
    pub order: Vec<T>,
    /// One write per item whose position differs from its input position.
    pub writes: Vec<PositionWrite<T::Id>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Applied { writes: usize },
    /// Some writes were rejected. The ones that succeeded stay applied.
    Failed { attempted: usize, failed: usize },
}

impl ReorderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReorderOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ReorderReport<T> {
    pub order: Vec<T>,
    pub outcome: ReorderOutcome,
}

/// Emitted after every persisted reorder so hosts re-fetch the canonical list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSignal {
    pub collection: Collection,
    pub succeeded: bool,
}

/// Moves the item at `from` to `to` and renumbers every position.
pub fn plan_move<T: OrderedItem>(
    mut items: Vec<T>,
    from: usize,
    to: usize,
) -> Result<MovePlan<T>, ReorderError> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(ReorderError::IndexOutOfRange { index, len });
        }
    }

    if from == to {
        return Ok(MovePlan {
            order: items,
            writes: Vec::new(),
        });
    }

    let moved = items.remove(from);
    items.insert(to, moved);

    let mut writes = Vec::new();
    for (index, item) in items.iter_mut().enumerate() {
        let position = index as u32;
        if item.position() != position {
            item.set_position(position);
            writes.push(PositionWrite {
                id: item.id(),
                position,
            });
        }
    }

    Ok(MovePlan {
        order: items,
        writes,
    })
}

/// Applies a single drag-and-drop move and persists the changed positions.
///
/// Writes are issued concurrently and all of them are awaited. A failed write
/// does not roll back the others and nothing is retried.
pub async fn reorder<T, S>(
    store: &S,
    items: Vec<T>,
    from: usize,
    to: usize,
) -> Result<ReorderReport<T>, ReorderError>
where
    T: OrderedItem,
    S: PositionStore<T::Id> + ?Sized,
{
    let MovePlan { order, writes } = plan_move(items, from, to)?;
    if writes.is_empty() {
        return Ok(ReorderReport {
            order,
            outcome: ReorderOutcome::Applied { writes: 0 },
        });
    }

    let results = join_all(
        writes
            .iter()
            .map(|write| store.set_position(write.id, write.position)),
    )
    .await;

    let attempted = writes.len();
    let mut failed = 0;
    for (write, result) in writes.iter().zip(results) {
        if let Err(error) = result {
            failed += 1;
            warn!(
                collection = %T::COLLECTION,
                id = %write.id,
                position = write.position,
                %error,
                "position write failed"
            );
        }
    }

    let outcome = if failed == 0 {
        ReorderOutcome::Applied { writes: attempted }
    } else {
        ReorderOutcome::Failed { attempted, failed }
    };
    info!(
        collection = %T::COLLECTION,
        from,
        to,
        attempted,
        failed,
        "reorder persisted"
    );

    Ok(ReorderReport { order, outcome })
}

/// Owns a persistence collaborator and announces completed reorders.
pub struct ReorderCoordinator<S> {
    store: S,
    refresh: broadcast::Sender<RefreshSignal>,
}

impl<S> ReorderCoordinator<S> {
    pub fn new(store: S) -> Self {
        let (refresh, _) = broadcast::channel(16);
        Self { store, refresh }
    }

    pub fn with_refresh(store: S, refresh: broadcast::Sender<RefreshSignal>) -> Self {
        Self { store, refresh }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshSignal> {
        self.refresh.subscribe()
    }

    /// Runs [`reorder`] and then signals a refresh, whatever the outcome.
    /// Input errors write nothing and signal nothing.
    pub async fn reorder<T>(
        &self,
        items: Vec<T>,
        from: usize,
        to: usize,
    ) -> Result<ReorderReport<T>, ReorderError>
    where
        T: OrderedItem,
        S: PositionStore<T::Id>,
    {
        let report = reorder(&self.store, items, from, to).await?;
        let _ = self.refresh.send(RefreshSignal {
            collection: T::COLLECTION,
            succeeded: report.outcome.is_success(),
        });
        Ok(report)
    }
}
