//! Typed algorithm adapters.
//!
//! User algorithms are plain functions over typed product references. The
//! traits here erase them into store-level executors while recording the
//! input arity and output count needed for declaration-time checking.
//! Implementations cover free functions and closures of one to four inputs;
//! bound variants additionally receive a shared algorithm instance.
//!
//! Return types are flexible at the seams: transforms return output tuples
//! (or `Result` of one), predicates return `bool` or `Result<bool>`,
//! observers and fold combiners return `()` or `Result<()>`, and unfold
//! generators return any iterator of child payloads.

use std::sync::Arc;

use crate::core::error::{PhlexError, Result};
use crate::model::{ProductStore, ProductValue, SpecifiedLabel};

/// Inputs of one invocation: the resolved store per label, in label order.
pub struct ResolvedInputs<'a> {
    stores: &'a [Arc<ProductStore>],
    labels: &'a [SpecifiedLabel],
}

impl<'a> ResolvedInputs<'a> {
    /// Bundle resolved stores with the labels they satisfy.
    pub fn new(stores: &'a [Arc<ProductStore>], labels: &'a [SpecifiedLabel]) -> Self {
        debug_assert_eq!(stores.len(), labels.len());
        Self { stores, labels }
    }

    /// Typed access to the input at `index`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<&'a T> {
        let label = &self.labels[index];
        self.stores[index]
            .get_product::<T>(label.name())
            .map_err(|e: crate::model::StoreError| PhlexError::from(e))
    }

    /// The resolved stores, in label order.
    pub fn stores(&self) -> &'a [Arc<ProductStore>] {
        self.stores
    }
}

// ---------------------------------------------------------------------------
// Return-type adapters

/// Transform return values: a tuple of outputs, or `Result` of one.
pub trait IntoProducts: Send + 'static {
    /// Number of products the value splits into.
    const COUNT: usize;
    /// Split into erased products, in declaration order.
    fn try_into_products(self) -> Result<Vec<ProductValue>>;
}

macro_rules! impl_into_products {
    ($count:expr => $(($T:ident, $idx:tt)),+) => {
        impl<$($T,)+> IntoProducts for ($($T,)+)
        where
            $($T: Send + Sync + 'static,)+
        {
            const COUNT: usize = $count;
            fn try_into_products(self) -> Result<Vec<ProductValue>> {
                Ok(vec![$(ProductValue::new(self.$idx),)+])
            }
        }
    };
}

impl_into_products!(1 => (A, 0));
impl_into_products!(2 => (A, 0), (B, 1));
impl_into_products!(3 => (A, 0), (B, 1), (C, 2));

impl<T: IntoProducts> IntoProducts for Result<T> {
    const COUNT: usize = T::COUNT;
    fn try_into_products(self) -> Result<Vec<ProductValue>> {
        self?.try_into_products()
    }
}

/// Predicate return values: `bool` or `Result<bool>`.
pub trait IntoPredicateResult: Send + 'static {
    /// Convert to the evaluated gate value.
    fn into_predicate_result(self) -> Result<bool>;
}

impl IntoPredicateResult for bool {
    fn into_predicate_result(self) -> Result<bool> {
        Ok(self)
    }
}

impl IntoPredicateResult for Result<bool> {
    fn into_predicate_result(self) -> Result<bool> {
        self
    }
}

/// Observer and fold-combiner return values: `()` or `Result<()>`.
pub trait IntoUnitResult: Send + 'static {
    /// Convert to the invocation outcome.
    fn into_unit_result(self) -> Result<()>;
}

impl IntoUnitResult for () {
    fn into_unit_result(self) -> Result<()> {
        Ok(())
    }
}

impl IntoUnitResult for Result<()> {
    fn into_unit_result(self) -> Result<()> {
        self
    }
}

// ---------------------------------------------------------------------------
// Algorithm shapes

/// A transform algorithm: typed inputs to a tuple of outputs.
pub trait TransformFn<Args>: Send + Sync + 'static {
    /// Number of typed inputs.
    fn arity(&self) -> usize;
    /// Number of outputs the return type splits into.
    fn output_count(&self) -> usize;
    /// Run against resolved inputs.
    fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<Vec<ProductValue>>;
}

/// A predicate algorithm: typed inputs to a gate value.
pub trait PredicateFn<Args>: Send + Sync + 'static {
    /// Number of typed inputs.
    fn arity(&self) -> usize;
    /// Run against resolved inputs.
    fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<bool>;
}

/// An observer algorithm: typed inputs, side effects only.
pub trait ObserverFn<Args>: Send + Sync + 'static {
    /// Number of typed inputs.
    fn arity(&self) -> usize;
    /// Run against resolved inputs.
    fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<()>;
}

/// A fold combiner: accumulates typed inputs into per-partition state.
pub trait FoldFn<S, Args>: Send + Sync + 'static {
    /// Number of typed inputs (state excluded).
    fn arity(&self) -> usize;
    /// Combine one set of inputs into the state.
    fn invoke(&self, state: &mut S, inputs: &ResolvedInputs<'_>) -> Result<()>;
}

/// An unfold generator: typed inputs to a sequence of child payloads.
pub trait UnfoldFn<Args>: Send + Sync + 'static {
    /// Number of typed inputs.
    fn arity(&self) -> usize;
    /// Produce the child payloads for one parent.
    fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<Vec<ProductValue>>;
}

/// A transform dispatched against a shared algorithm instance.
pub trait BoundTransformFn<T, Args>: Send + Sync + 'static {
    /// Number of typed inputs (instance excluded).
    fn arity(&self) -> usize;
    /// Number of outputs the return type splits into.
    fn output_count(&self) -> usize;
    /// Run against the instance and resolved inputs.
    fn invoke(&self, instance: &T, inputs: &ResolvedInputs<'_>) -> Result<Vec<ProductValue>>;
}

/// A predicate dispatched against a shared algorithm instance.
pub trait BoundPredicateFn<T, Args>: Send + Sync + 'static {
    /// Number of typed inputs (instance excluded).
    fn arity(&self) -> usize;
    /// Run against the instance and resolved inputs.
    fn invoke(&self, instance: &T, inputs: &ResolvedInputs<'_>) -> Result<bool>;
}

/// An observer dispatched against a shared algorithm instance.
pub trait BoundObserverFn<T, Args>: Send + Sync + 'static {
    /// Number of typed inputs (instance excluded).
    fn arity(&self) -> usize;
    /// Run against the instance and resolved inputs.
    fn invoke(&self, instance: &T, inputs: &ResolvedInputs<'_>) -> Result<()>;
}

macro_rules! impl_algorithm_fns {
    ($count:expr => $(($T:ident, $idx:tt)),+) => {
        impl<Func, Out, $($T,)+> TransformFn<($($T,)+)> for Func
        where
            Func: Fn($(&$T,)+) -> Out + Send + Sync + 'static,
            Out: IntoProducts,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn output_count(&self) -> usize {
                Out::COUNT
            }
            fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<Vec<ProductValue>> {
                (self)($(inputs.get::<$T>($idx)?,)+).try_into_products()
            }
        }

        impl<Func, Out, $($T,)+> PredicateFn<($($T,)+)> for Func
        where
            Func: Fn($(&$T,)+) -> Out + Send + Sync + 'static,
            Out: IntoPredicateResult,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<bool> {
                (self)($(inputs.get::<$T>($idx)?,)+).into_predicate_result()
            }
        }

        impl<Func, Out, $($T,)+> ObserverFn<($($T,)+)> for Func
        where
            Func: Fn($(&$T,)+) -> Out + Send + Sync + 'static,
            Out: IntoUnitResult,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<()> {
                (self)($(inputs.get::<$T>($idx)?,)+).into_unit_result()
            }
        }

        impl<Func, Out, State, $($T,)+> FoldFn<State, ($($T,)+)> for Func
        where
            Func: Fn(&mut State, $(&$T,)+) -> Out + Send + Sync + 'static,
            Out: IntoUnitResult,
            State: Send + 'static,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn invoke(&self, state: &mut State, inputs: &ResolvedInputs<'_>) -> Result<()> {
                (self)(state, $(inputs.get::<$T>($idx)?,)+).into_unit_result()
            }
        }

        impl<Func, Seq, $($T,)+> UnfoldFn<($($T,)+)> for Func
        where
            Func: Fn($(&$T,)+) -> Seq + Send + Sync + 'static,
            Seq: IntoIterator + Send + 'static,
            Seq::Item: Send + Sync + 'static,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn invoke(&self, inputs: &ResolvedInputs<'_>) -> Result<Vec<ProductValue>> {
                Ok((self)($(inputs.get::<$T>($idx)?,)+)
                    .into_iter()
                    .map(ProductValue::new)
                    .collect())
            }
        }

        impl<Func, Inst, Out, $($T,)+> BoundTransformFn<Inst, ($($T,)+)> for Func
        where
            Func: Fn(&Inst, $(&$T,)+) -> Out + Send + Sync + 'static,
            Inst: Send + Sync + 'static,
            Out: IntoProducts,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn output_count(&self) -> usize {
                Out::COUNT
            }
            fn invoke(
                &self,
                instance: &Inst,
                inputs: &ResolvedInputs<'_>,
            ) -> Result<Vec<ProductValue>> {
                (self)(instance, $(inputs.get::<$T>($idx)?,)+).try_into_products()
            }
        }

        impl<Func, Inst, Out, $($T,)+> BoundPredicateFn<Inst, ($($T,)+)> for Func
        where
            Func: Fn(&Inst, $(&$T,)+) -> Out + Send + Sync + 'static,
            Inst: Send + Sync + 'static,
            Out: IntoPredicateResult,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn invoke(&self, instance: &Inst, inputs: &ResolvedInputs<'_>) -> Result<bool> {
                (self)(instance, $(inputs.get::<$T>($idx)?,)+).into_predicate_result()
            }
        }

        impl<Func, Inst, Out, $($T,)+> BoundObserverFn<Inst, ($($T,)+)> for Func
        where
            Func: Fn(&Inst, $(&$T,)+) -> Out + Send + Sync + 'static,
            Inst: Send + Sync + 'static,
            Out: IntoUnitResult,
            $($T: Send + Sync + 'static,)+
        {
            fn arity(&self) -> usize {
                $count
            }
            fn invoke(&self, instance: &Inst, inputs: &ResolvedInputs<'_>) -> Result<()> {
                (self)(instance, $(inputs.get::<$T>($idx)?,)+).into_unit_result()
            }
        }
    };
}

impl_algorithm_fns!(1 => (A, 0));
impl_algorithm_fns!(2 => (A, 0), (B, 1));
impl_algorithm_fns!(3 => (A, 0), (B, 1), (C, 2));
impl_algorithm_fns!(4 => (A, 0), (B, 1), (C, 2), (D, 3));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products;

    fn event_with_x(x: i32) -> Arc<ProductStore> {
        ProductStore::base().make_child(0, "event", "gen", products! { "x" => x })
    }

    fn labels(specs: &[&str]) -> Vec<SpecifiedLabel> {
        specs.iter().map(|s| SpecifiedLabel::parse(s)).collect()
    }

    #[test]
    fn test_transform_closure_adapts() {
        let double = |x: &i32| (2 * x,);
        assert_eq!(TransformFn::arity(&double), 1);
        assert_eq!(TransformFn::output_count(&double), 1);

        let store = event_with_x(3);
        let labels = labels(&["x"]);
        let stores = vec![store];
        let inputs = ResolvedInputs::new(&stores, &labels);
        let out = TransformFn::invoke(&double, &inputs).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(*out[0].get::<i32>().unwrap(), 6);
    }

    #[test]
    fn test_fallible_transform_propagates() {
        let failing = |_x: &i32| -> Result<(i32,)> {
            Err(PhlexError::Execution {
                node: "t".into(),
                message: "boom".into(),
            })
        };
        let store = event_with_x(3);
        let labels = labels(&["x"]);
        let stores = vec![store];
        let inputs = ResolvedInputs::new(&stores, &labels);
        assert!(TransformFn::invoke(&failing, &inputs).is_err());
    }

    #[test]
    fn test_predicate_closure_adapts() {
        let positive = |x: &i32| *x > 0;
        assert_eq!(PredicateFn::arity(&positive), 1);
        let store = event_with_x(-1);
        let labels = labels(&["x"]);
        let stores = vec![store];
        let inputs = ResolvedInputs::new(&stores, &labels);
        assert!(!PredicateFn::invoke(&positive, &inputs).unwrap());
    }

    #[test]
    fn test_fold_closure_adapts() {
        let sum = |state: &mut i64, x: &i32| *state += i64::from(*x);
        assert_eq!(FoldFn::arity(&sum), 1);
        let store = event_with_x(5);
        let labels = labels(&["x"]);
        let stores = vec![store];
        let inputs = ResolvedInputs::new(&stores, &labels);
        let mut state = 1i64;
        FoldFn::invoke(&sum, &mut state, &inputs).unwrap();
        assert_eq!(state, 6);
    }

    #[test]
    fn test_unfold_closure_adapts() {
        let split = |hits: &Vec<String>| hits.clone();
        let store = ProductStore::base().make_child(
            0,
            "event",
            "gen",
            products! { "hits" => vec!["a".to_string(), "b".to_string()] },
        );
        let labels = labels(&["hits"]);
        let stores = vec![store];
        let inputs = ResolvedInputs::new(&stores, &labels);
        let out = UnfoldFn::invoke(&split, &inputs).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].get::<String>().unwrap(), "b");
    }

    #[test]
    fn test_bound_transform_dispatches_against_instance() {
        struct Scaler {
            factor: i32,
        }
        impl Scaler {
            fn scale(&self, x: &i32) -> (i32,) {
                (self.factor * x,)
            }
        }

        let method = Scaler::scale;
        let instance = Scaler { factor: 10 };
        let store = event_with_x(4);
        let labels = labels(&["x"]);
        let stores = vec![store];
        let inputs = ResolvedInputs::new(&stores, &labels);
        let out = BoundTransformFn::invoke(&method, &instance, &inputs).unwrap();
        assert_eq!(*out[0].get::<i32>().unwrap(), 40);
    }

    #[test]
    fn test_input_resolution_spans_labels() {
        let base = ProductStore::base();
        let event = base.make_child(0, "event", "gen", products! { "x" => 2i32 });
        let cont = event.make_continuation("calib", products! { "offset" => 5i32 });

        let add = |x: &i32, offset: &i32| (x + offset,);
        let labels = labels(&["x", "offset"]);
        let stores = vec![event, cont];
        let inputs = ResolvedInputs::new(&stores, &labels);
        let out = TransformFn::invoke(&add, &inputs).unwrap();
        assert_eq!(*out[0].get::<i32>().unwrap(), 7);
    }
}
