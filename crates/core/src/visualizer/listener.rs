use super::{Added, Removed, Reordered, VisualizerNode};
use std::sync::Arc;

/// View-side observer of a mirror and, through the ancestor walk, of every
/// mirror below it.
///
/// Callbacks arrive on the delivery thread after the change is fully applied.
pub trait NodeModel: Send + Sync {
    fn added(&self, event: &Added);

    fn removed(&self, event: &Removed);

    fn reordered(&self, event: &Reordered);

    /// Display attributes of `node` changed.
    fn update(&self, node: &Arc<VisualizerNode>);

    /// `node` became a leaf or stopped being one; its children are rebuilt
    /// on next access.
    fn structural_change(&self, node: &Arc<VisualizerNode>);
}

pub(crate) fn same_model(a: &Arc<dyn NodeModel>, b: &Arc<dyn NodeModel>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
