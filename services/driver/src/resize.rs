//! Node pool resize reconciliation.

use doks_reconcile::ScaleBounds;
use doks_state::NodePoolState;

use crate::gateway::NodePoolSnapshot;

/// Shape to submit when resizing `live` to `requested` nodes.
///
/// The count is always set. When autoscaling is on and the count falls
/// outside the live bounds, only the violated bound moves to meet it.
/// With autoscaling off the bounds are left exactly as they are.
///
/// `live` must be freshly fetched so that autoscaler adjustments made on the
/// provider side are not overwritten.
pub fn resize(live: &NodePoolSnapshot, requested: u32) -> NodePoolState {
    let mut desired = live.to_desired();

    if desired.autoscale_enabled() {
        let bounds = ScaleBounds::new(desired.min_nodes, desired.max_nodes).widen_to(requested);
        desired.min_nodes = bounds.min;
        desired.max_nodes = bounds.max;
    }

    desired.count = requested;
    desired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(auto_scale: bool) -> NodePoolSnapshot {
        NodePoolSnapshot {
            id: "pool-1".into(),
            name: "workers".into(),
            size: "s-2vcpu-4gb".into(),
            count: 5,
            auto_scale,
            min_nodes: 2,
            max_nodes: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_growing_past_max_widens_max_only() {
        let desired = resize(&live(true), 8);
        assert_eq!((desired.count, desired.min_nodes, desired.max_nodes), (8, 2, 8));
    }

    #[test]
    fn test_shrinking_below_min_widens_min_only() {
        let desired = resize(&live(true), 1);
        assert_eq!((desired.count, desired.min_nodes, desired.max_nodes), (1, 1, 6));
    }

    #[test]
    fn test_resize_within_bounds_keeps_bounds() {
        let desired = resize(&live(true), 4);
        assert_eq!((desired.count, desired.min_nodes, desired.max_nodes), (4, 2, 6));
    }

    #[test]
    fn test_bounds_untouched_without_autoscale() {
        for requested in [0, 1, 8, 20] {
            let desired = resize(&live(false), requested);
            assert_eq!(desired.count, requested);
            assert_eq!(desired.min_nodes, 2);
            assert_eq!(desired.max_nodes, 6);
            assert_eq!(desired.auto_scale, Some(false));
        }
    }

    #[test]
    fn test_resize_keeps_identity_fields() {
        let desired = resize(&live(true), 3);
        assert_eq!(desired.name, "workers");
        assert_eq!(desired.size, "s-2vcpu-4gb");
    }
}
