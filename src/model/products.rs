//! Type-erased products and the append-only product map.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Errors raised by product-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Adding a key that is already present is a logic error.
    #[error("product '{0}' is already present")]
    ProductExists(String),

    /// A typed lookup found no product under the key.
    #[error("product '{0}' not found")]
    ProductMissing(String),

    /// A typed lookup found a payload of a different type.
    #[error("product '{key}' holds '{actual}', requested '{requested}'")]
    ProductType {
        /// Product key
        key: String,
        /// Stored payload type name
        actual: &'static str,
        /// Requested payload type name
        requested: &'static str,
    },

    /// Flush stores never carry products.
    #[error("flush stores cannot carry products")]
    FlushProducts,
}

/// A single published product: shared, immutable payload plus its type name.
#[derive(Clone)]
pub struct ProductValue {
    data: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ProductValue {
    /// Wrap a payload.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            data: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Typed access to the payload.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// The payload's type name, as agreed between producer and consumer.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The erased payload.
    pub fn data(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.data
    }
}

impl fmt::Debug for ProductValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Append-only map of `product_name -> product`.
#[derive(Debug, Clone, Default)]
pub struct Products {
    map: BTreeMap<String, ProductValue>,
}

impl Products {
    /// An empty product map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a product; re-adding an existing key is a logic error.
    pub fn add(&mut self, key: impl Into<String>, value: ProductValue) -> Result<(), StoreError> {
        let key = key.into();
        if self.map.contains_key(&key) {
            return Err(StoreError::ProductExists(key));
        }
        self.map.insert(key, value);
        Ok(())
    }

    /// Whether a product is present under the key.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// The erased product under the key.
    pub fn get(&self, key: &str) -> Option<&ProductValue> {
        self.map.get(key)
    }

    /// Typed access to the product under the key.
    pub fn get_typed<T: Send + Sync + 'static>(&self, key: &str) -> Result<&T, StoreError> {
        let value = self
            .map
            .get(key)
            .ok_or_else(|| StoreError::ProductMissing(key.to_string()))?;
        value.get::<T>().ok_or_else(|| StoreError::ProductType {
            key: key.to_string(),
            actual: value.type_name(),
            requested: std::any::type_name::<T>(),
        })
    }

    /// Iterate products in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProductValue)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of products.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(String, ProductValue)> for Products {
    fn from_iter<I: IntoIterator<Item = (String, ProductValue)>>(iter: I) -> Self {
        let mut products = Products::new();
        for (key, value) in iter {
            // Later duplicates are a caller bug; keep the first.
            let _ = products.add(key, value);
        }
        products
    }
}

/// Build a [`Products`] map from `name => value` pairs.
///
/// ```
/// use phlex_core::products;
/// let p = products! { "x" => 3i32, "label" => String::from("calib") };
/// assert_eq!(*p.get_typed::<i32>("x").unwrap(), 3);
/// ```
#[macro_export]
macro_rules! products {
    () => { $crate::model::Products::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::model::Products::new();
        $(
            map.add($key, $crate::model::ProductValue::new($value))
                .expect("duplicate product key in products! literal");
        )+
        map
    }};
}
