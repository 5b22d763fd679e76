//! User and product records owned by the producer services.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{ProductId, UserId};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Record store unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock: i64,
}

/// Partial product update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub stock: Option<i64>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Emails are unique.
    async fn create(&self, email: &str) -> Result<User, RecordError>;
    async fn get(&self, id: UserId) -> Result<Option<User>, RecordError>;
    async fn list(&self) -> Result<Vec<User>, RecordError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, name: &str, stock: i64) -> Result<Product, RecordError>;
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RecordError>;
    async fn list(&self) -> Result<Vec<Product>, RecordError>;
    /// Applies `changes`; `None` when the product does not exist.
    async fn update(&self, id: ProductId, changes: ProductChanges) -> Result<Option<Product>, RecordError>;
}

#[derive(Debug)]
struct Table<K, V> {
    rows: BTreeMap<K, V>,
    next_id: i64,
    unavailable: bool,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 0,
            unavailable: false,
        }
    }
}

impl<K, V> Table<K, V> {
    fn check(&self) -> Result<(), RecordError> {
        if self.unavailable {
            Err(RecordError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    table: Arc<RwLock<Table<UserId, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, email: &str) -> Result<User, RecordError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        if table.rows.values().any(|user| user.email == email) {
            return Err(RecordError::DuplicateEmail);
        }
        table.next_id += 1;
        let user = User {
            id: UserId::new(table.next_id),
            email: email.to_string(),
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, RecordError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RecordError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        Ok(table.rows.values().cloned().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    table: Arc<RwLock<Table<ProductId, Product>>>,
}

impl InMemoryProductStore {
    /// Stock given to each seeded product.
    pub const SEED_STOCK: i64 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding products 1 to 3, each with [`Self::SEED_STOCK`].
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut table = store.table.write().unwrap_or_else(PoisonError::into_inner);
            for id in 1..=3 {
                table.rows.insert(
                    ProductId::new(id),
                    Product {
                        id: ProductId::new(id),
                        name: format!("Product {id}"),
                        stock: Self::SEED_STOCK,
                    },
                );
            }
            table.next_id = 3;
        }
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn create(&self, name: &str, stock: i64) -> Result<Product, RecordError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        table.next_id += 1;
        let product = Product {
            id: ProductId::new(table.next_id),
            name: name.to_string(),
            stock,
        };
        table.rows.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RecordError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>, RecordError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        Ok(table.rows.values().cloned().collect())
    }

    async fn update(&self, id: ProductId, changes: ProductChanges) -> Result<Option<Product>, RecordError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.check()?;
        let Some(product) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            product.name = name;
        }
        if let Some(stock) = changes.stock {
            product.stock = stock;
        }
        Ok(Some(product.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let users = InMemoryUserStore::new();
        let first = users.create("a@example.com").await.unwrap();
        assert_eq!(first.id, UserId::new(1));
        assert_eq!(
            users.create("a@example.com").await,
            Err(RecordError::DuplicateEmail)
        );
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_products() {
        let products = InMemoryProductStore::seeded();
        let all = products.list().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|p| p.stock == 100));

        let created = products.create("Keyboard", 5).await.unwrap();
        assert_eq!(created.id, ProductId::new(4));
    }

    #[tokio::test]
    async fn test_partial_update() {
        let products = InMemoryProductStore::seeded();
        let updated = products
            .update(
                ProductId::new(2),
                ProductChanges {
                    name: None,
                    stock: Some(7),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Product 2");
        assert_eq!(updated.stock, 7);

        let missing = products
            .update(ProductId::new(99), ProductChanges::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let users = InMemoryUserStore::new();
        users.set_unavailable(true);
        assert_eq!(users.get(UserId::new(1)).await, Err(RecordError::Unavailable));
    }
}
