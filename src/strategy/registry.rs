//! In-memory registry of the orders one instrument has placed.

use std::collections::HashMap;

use crate::domain::ManagedOrder;

/// Orders keyed by exchange id, iterated in placement order
#[derive(Debug, Default, Clone)]
pub struct OrderRegistry {
    orders: HashMap<String, ManagedOrder>,
    order: Vec<String>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an order; re-inserting an id replaces the record in place
    pub fn insert(&mut self, order: ManagedOrder) {
        if !self.orders.contains_key(&order.order_id) {
            self.order.push(order.order_id.clone());
        }
        self.orders.insert(order.order_id.clone(), order);
    }

    pub fn get(&self, order_id: &str) -> Option<&ManagedOrder> {
        self.orders.get(order_id)
    }

    pub fn get_mut(&mut self, order_id: &str) -> Option<&mut ManagedOrder> {
        self.orders.get_mut(order_id)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedOrder> {
        self.order.iter().filter_map(|id| self.orders.get(id))
    }

    /// Ids of orders whose last known status is not terminal
    pub fn pending_ids(&self) -> Vec<String> {
        self.iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.order_id.clone())
            .collect()
    }

    /// Full history in placement order
    pub fn snapshot(&self) -> Vec<ManagedOrder> {
        self.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderKind, OrderSide, OrderStatus, PositionSide};
    use rust_decimal_macros::dec;

    fn order(id: &str, side: PositionSide, kind: OrderKind) -> ManagedOrder {
        ManagedOrder::new(
            id,
            "BTCUSDT",
            side.opening_side(),
            side,
            kind,
            dec!(0.01),
        )
    }

    #[test]
    fn test_snapshot_keeps_placement_order() {
        let mut reg = OrderRegistry::new();
        for id in ["z", "a", "m"] {
            reg.insert(order(id, PositionSide::Long, OrderKind::Entry));
        }
        let ids: Vec<String> = reg.snapshot().into_iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_reinsert_replaces_without_duplicating() {
        let mut reg = OrderRegistry::new();
        reg.insert(order("1", PositionSide::Long, OrderKind::Entry));
        let mut updated = order("1", PositionSide::Long, OrderKind::Entry);
        updated.side = OrderSide::Sell;
        reg.insert(updated);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("1").unwrap().side, OrderSide::Sell);
    }

    #[test]
    fn test_pending_ids_skip_terminal_orders() {
        let mut reg = OrderRegistry::new();
        reg.insert(order("1", PositionSide::Long, OrderKind::Entry));
        reg.insert(order("2", PositionSide::Short, OrderKind::Entry));
        reg.insert(order("3", PositionSide::Long, OrderKind::StopLoss));
        reg.get_mut("1").unwrap().mark_status(OrderStatus::Filled);
        reg.get_mut("3").unwrap().mark_status(OrderStatus::PartiallyFilled);

        assert_eq!(reg.pending_ids(), vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut reg = OrderRegistry::new();
        reg.insert(order("1", PositionSide::Long, OrderKind::Entry));
        reg.clear();
        assert!(reg.is_empty());
        assert!(!reg.contains("1"));
        assert!(reg.pending_ids().is_empty());
    }
}
