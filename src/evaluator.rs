use rust_decimal::Decimal;

use crate::models::{AlertRecord, WatchedItem};

/// Alert iff the fetched price is strictly below the item threshold.
/// A price equal to the threshold is not an alert.
pub fn evaluate(item: &WatchedItem, price: Decimal) -> Option<AlertRecord> {
    if price < item.threshold {
        Some(AlertRecord {
            label: item.label.clone(),
            id: item.id.clone(),
            price,
            threshold: item.threshold,
        })
    } else {
        None
    }
}
