//! Shopping cart.
//!
//! Works for guests and members alike. Every mutation is written through to
//! storage before it becomes visible; a failed write leaves the cart as it
//! was.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::sync::Arc;

use aktar_common::{AktarError, constants::storage_keys};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ClientError;
use crate::storage::{Storage, heal, read_present};

/// Amount in kuruş (1/100 TRY)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    pub const ZERO: Price = Price(0);

    pub const fn from_kurus(kurus: u64) -> Self {
        Self(kurus)
    }

    pub const fn kurus(self) -> u64 {
        self.0
    }

    /// Line total, saturating
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }
}

impl Add for Price {
    type Output = Price;

    fn add(self, rhs: Price) -> Price {
        Price(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Price>>(iter: I) -> Price {
        iter.fold(Price::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{:02} ₺", self.0 / 100, self.0 % 100)
    }
}

/// Catalogue entry as shown on a product page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Price,
    pub stock: u32,
}

/// One cart line. `quantity` is always in `1..=stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub price: Price,
    pub quantity: u32,
    /// Stock when the line was last touched
    pub stock: u32,
}

pub struct CartStore {
    storage: Arc<dyn Storage>,
    items: watch::Sender<Vec<CartItem>>,
}

impl CartStore {
    /// Rehydrate from storage.
    ///
    /// An unparseable blob is discarded. Lines that break the quantity bound
    /// are dropped and the cleaned list is written back.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let mut items = match read_present(storage.as_ref(), storage_keys::CART) {
            Some(raw) => match serde_json::from_str::<Vec<CartItem>>(&raw) {
                Ok(items) => items,
                Err(e) => {
                    heal(storage.as_ref(), storage_keys::CART, &e.to_string());
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let before = items.len();
        items.retain(|item| item.quantity > 0 && item.quantity <= item.stock);
        if items.len() != before {
            tracing::warn!(dropped = before - items.len(), "Dropped invalid cart lines");
            if let Err(e) = persist(storage.as_ref(), &items) {
                tracing::warn!(error = %e, "Failed to rewrite cleaned cart");
            }
        }

        let (items, _) = watch::channel(items);
        Self { storage, items }
    }

    /// Add `quantity` units, merging with an existing line.
    ///
    /// Refreshes the line's name, price and stock from `product`. Rejected
    /// with `InsufficientStock` if the merged quantity would exceed stock.
    pub fn add_item(&self, product: &Product, quantity: u32) -> Result<(), ClientError> {
        if quantity == 0 {
            return Err(AktarError::Validation("Adet en az 1 olmalı".to_string()).into());
        }

        let mut items = self.items();
        let existing = items.iter().position(|i| i.product_id == product.id);
        let current = existing.map_or(0, |idx| items[idx].quantity);
        let wanted = current.saturating_add(quantity);

        if wanted > product.stock {
            return Err(insufficient(&product.id, product.stock));
        }

        let line = CartItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            quantity: wanted,
            stock: product.stock,
        };
        match existing {
            Some(idx) => items[idx] = line,
            None => items.push(line),
        }

        self.commit(items)
    }

    /// Set a line's quantity; `<= 0` removes it. Unknown products are ignored.
    pub fn update_quantity(&self, product_id: &str, quantity: i64) -> Result<(), ClientError> {
        if quantity <= 0 {
            return self.remove_item(product_id);
        }

        let mut items = self.items();
        let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) else {
            return Ok(());
        };
        if quantity > item.stock as i64 {
            return Err(insufficient(product_id, item.stock));
        }
        if item.quantity as i64 == quantity {
            return Ok(());
        }
        item.quantity = quantity as u32;

        self.commit(items)
    }

    /// No-op if the product is not in the cart
    pub fn remove_item(&self, product_id: &str) -> Result<(), ClientError> {
        let mut items = self.items();
        let before = items.len();
        items.retain(|i| i.product_id != product_id);
        if items.len() == before {
            return Ok(());
        }
        self.commit(items)
    }

    /// Empty the cart and wipe its persisted copy
    pub fn clear(&self) -> Result<(), ClientError> {
        self.storage.remove(storage_keys::CART)?;
        self.items.send_replace(Vec::new());
        Ok(())
    }

    /// Snapshot of the current lines
    pub fn items(&self) -> Vec<CartItem> {
        self.items.borrow().clone()
    }

    pub fn total_price(&self) -> Price {
        self.items
            .borrow()
            .iter()
            .map(|i| i.price.times(i.quantity))
            .sum()
    }

    pub fn total_items(&self) -> u64 {
        self.items.borrow().iter().map(|i| i.quantity as u64).sum()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<CartItem>> {
        self.items.subscribe()
    }

    fn commit(&self, items: Vec<CartItem>) -> Result<(), ClientError> {
        persist(self.storage.as_ref(), &items)?;
        self.items.send_replace(items);
        Ok(())
    }
}

fn persist(storage: &dyn Storage, items: &[CartItem]) -> Result<(), ClientError> {
    let blob = serde_json::to_string(items).map_err(|e| ClientError::Storage(e.to_string()))?;
    storage.set(storage_keys::CART, &blob)
}

fn insufficient(product_id: &str, available: u32) -> ClientError {
    AktarError::InsufficientStock {
        product_id: product_id.to_string(),
        available,
    }
    .into()
}
