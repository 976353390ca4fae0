//! The product store hierarchy.
//!
//! A [`ProductStore`] is one node of a persistent tree of immutable
//! key/value maps. Children hold their parent alive, so a store is
//! guaranteed to outlive every descendant that can still reach it, and a
//! published store is never mutated again.

use std::fmt;
use std::sync::Arc;

use super::level_id::LevelId;
use super::products::{ProductValue, Products, StoreError};

/// Processing stage of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A store carrying data to process.
    Process,
    /// A sentinel store closing its level instance; carries no products.
    Flush,
}

/// A node in the store hierarchy, carrying products at one level.
pub struct ProductStore {
    parent: Option<Arc<ProductStore>>,
    id: Arc<LevelId>,
    source: String,
    stage: Stage,
    products: Products,
}

impl ProductStore {
    /// The root store: stage process, id `job:0`, no products.
    pub fn base() -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: None,
            id: LevelId::base(),
            source: String::new(),
            stage: Stage::Process,
            products: Products::new(),
        })
    }

    /// Create a child process store carrying `products`.
    pub fn make_child(
        self: &Arc<Self>,
        number: usize,
        level_name: &str,
        source: &str,
        products: Products,
    ) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: Some(Arc::clone(self)),
            id: self.id.make_child(number, level_name),
            source: source.to_string(),
            stage: Stage::Process,
            products,
        })
    }

    /// Create an empty child store at the given stage.
    pub fn make_child_at(
        self: &Arc<Self>,
        number: usize,
        level_name: &str,
        source: &str,
        stage: Stage,
    ) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: Some(Arc::clone(self)),
            id: self.id.make_child(number, level_name),
            source: source.to_string(),
            stage,
            products: Products::new(),
        })
    }

    /// Create a continuation: same id, this store as parent, new products.
    pub fn make_continuation(
        self: &Arc<Self>,
        source: &str,
        products: Products,
    ) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: Some(Arc::clone(self)),
            id: Arc::clone(&self.id),
            source: source.to_string(),
            stage: Stage::Process,
            products,
        })
    }

    /// Create the flush sibling: same id and parent, stage flush, empty.
    pub fn make_flush(self: &Arc<Self>) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: self.parent.clone(),
            id: Arc::clone(&self.id),
            source: self.source.clone(),
            stage: Stage::Flush,
            products: Products::new(),
        })
    }

    /// The level identifier.
    pub fn id(&self) -> &Arc<LevelId> {
        &self.id
    }

    /// The level name of this store's id.
    pub fn level_name(&self) -> &str {
        self.id.level_name()
    }

    /// Origin tag: the framework source or the full name of the publishing
    /// node.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The processing stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether this is a flush sentinel.
    pub fn is_flush(&self) -> bool {
        self.stage == Stage::Flush
    }

    /// The parent store, if any.
    pub fn parent(&self) -> Option<&Arc<ProductStore>> {
        self.parent.as_ref()
    }

    /// Nearest self-or-ancestor store whose id sits at the given level.
    pub fn ancestor_at(self: &Arc<Self>, level_name: &str) -> Option<Arc<ProductStore>> {
        let mut current = Some(self);
        while let Some(store) = current {
            if store.level_name() == level_name {
                return Some(Arc::clone(store));
            }
            current = store.parent.as_ref();
        }
        None
    }

    /// Nearest strict ancestor whose id sits at the given level.
    pub fn parent_at(self: &Arc<Self>, level_name: &str) -> Option<Arc<ProductStore>> {
        self.parent.as_ref()?.ancestor_at(level_name)
    }

    /// Whether this store's own map holds the product.
    pub fn contains_product(&self, key: &str) -> bool {
        self.products.contains(key)
    }

    /// Typed access to a product in this store's own map.
    pub fn get_product<T: Send + Sync + 'static>(&self, key: &str) -> Result<&T, StoreError> {
        self.products.get_typed(key)
    }

    /// This store's own products.
    pub fn products(&self) -> &Products {
        &self.products
    }

    /// Nearest self-or-ancestor store owning the product, if any.
    ///
    /// The closest owner wins, so a reader always sees the most-derived
    /// published value.
    pub fn store_for_product(self: &Arc<Self>, key: &str) -> Option<Arc<ProductStore>> {
        self.store_for_product_from(key, |_| true)
    }

    /// Like [`Self::store_for_product`], restricted to owners accepted by
    /// `accept` (e.g. a producer-qualifier check on the owner's source tag).
    pub fn store_for_product_from(
        self: &Arc<Self>,
        key: &str,
        accept: impl Fn(&ProductStore) -> bool,
    ) -> Option<Arc<ProductStore>> {
        let mut current = Some(self);
        while let Some(store) = current {
            if store.products.contains(key) && accept(store) {
                return Some(Arc::clone(store));
            }
            current = store.parent.as_ref();
        }
        None
    }

    /// Whether `self` lies strictly below `other` in the store tree.
    pub fn is_descendant_of(&self, other: &Arc<ProductStore>) -> bool {
        let mut current = self.parent.as_ref();
        while let Some(store) = current {
            if Arc::ptr_eq(store, other) {
                return true;
            }
            current = store.parent.as_ref();
        }
        false
    }
}

impl fmt::Debug for ProductStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductStore")
            .field("id", &self.id.to_string())
            .field("stage", &self.stage)
            .field("source", &self.source)
            .field("products", &self.products.len())
            .finish()
    }
}

/// Of two stores, the one deeper in the hierarchy.
///
/// A descendant wins over its ancestor; when the stores are incomparable
/// the second wins.
pub fn most_derived(a: &Arc<ProductStore>, b: &Arc<ProductStore>) -> Arc<ProductStore> {
    if a.is_descendant_of(b) {
        Arc::clone(a)
    } else {
        Arc::clone(b)
    }
}

/// Left fold of [`most_derived`] over a non-empty sequence of stores.
pub fn most_derived_of(stores: &[Arc<ProductStore>]) -> Option<Arc<ProductStore>> {
    let (first, rest) = stores.split_first()?;
    let mut chosen = Arc::clone(first);
    for store in rest {
        chosen = most_derived(&chosen, store);
    }
    Some(chosen)
}
