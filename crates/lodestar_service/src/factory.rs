//! Bound factories.
//!
//! A [`Factory`] is an opaque capability: given the already-resolved values of
//! its declared dependencies, it produces an [`Instance`] or fails. The engine
//! never needs to know how a factory was built.
//!
//! Most factories are plain closures. Parameters of type `Arc<T>` declare a
//! dependency on the unqualified key of `T`:
//!
//! ```
//! use std::sync::Arc;
//! use lodestar_service::factory::IntoFactory;
//! use lodestar_service::key::Key;
//!
//! struct Config { port: u16 }
//! struct Server { port: u16 }
//!
//! fn make_server(config: Arc<Config>) -> Server {
//!     Server { port: config.port }
//! }
//!
//! assert_eq!(
//!     <fn(Arc<Config>) -> Server as IntoFactory<_>>::dependencies(),
//!     vec![Key::of::<Config>()]
//! );
//! ```
//!
//! Dependencies on qualified keys use [`factory_fn`] with an explicit key list
//! and read values through [`Dependencies`].

use core::marker::PhantomData;
use std::sync::Arc;

use variadics_please::all_tuples;

use crate::error::ConstructionError;
use crate::key::Key;
use crate::service::{Instance, Service};

/// An object-safe factory producing a service value from its dependencies.
pub trait Factory: Send + Sync + 'static {
    /// Produces a value.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError`] if a dependency has an unexpected type
    /// or the underlying constructor fails.
    fn invoke(&self, dependencies: &Dependencies<'_>) -> Result<Instance, ConstructionError>;

    /// Returns a name for debugging.
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// The resolved dependency values handed to a [`Factory`], in declaration
/// order.
pub struct Dependencies<'a> {
    owner: &'a Key,
    values: &'a [(Key, Instance)],
}

impl<'a> Dependencies<'a> {
    /// Creates a dependency view for the entry `owner`.
    #[must_use]
    pub fn new(owner: &'a Key, values: &'a [(Key, Instance)]) -> Self {
        Self { owner, values }
    }

    /// Returns the key of the entry being constructed.
    #[must_use]
    pub fn owner(&self) -> &Key {
        self.owner
    }

    /// Returns the number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the dependency value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::MissingDependency`] if fewer dependencies
    /// were declared.
    pub fn instance(&self, index: usize) -> Result<&Instance, ConstructionError> {
        self.values
            .get(index)
            .map(|(_, instance)| instance)
            .ok_or_else(|| ConstructionError::MissingDependency {
                key: self.owner.clone(),
                index,
            })
    }

    /// Returns the dependency at `index` as a `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or the value is not a `T`.
    pub fn get<T: Service>(&self, index: usize) -> Result<Arc<T>, ConstructionError> {
        let instance = self.instance(index)?;
        self.downcast(instance)
    }

    /// Returns the dependency declared under `key` as a `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` was not declared or the value is not a `T`.
    pub fn get_keyed<T: Service>(&self, key: &Key) -> Result<Arc<T>, ConstructionError> {
        let instance = self
            .values
            .iter()
            .find(|(declared, _)| declared == key)
            .map(|(_, instance)| instance)
            .ok_or_else(|| ConstructionError::MissingDependency {
                key: self.owner.clone(),
                index: self.values.len(),
            })?;
        self.downcast(instance)
    }

    /// Iterates over `(declared key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Instance)> {
        self.values.iter().map(|(key, instance)| (key, instance))
    }

    /// Returns a cursor that hands out dependencies in order.
    #[must_use]
    pub fn cursor(&self) -> DependencyCursor<'_, 'a> {
        DependencyCursor {
            dependencies: self,
            next: 0,
        }
    }

    fn downcast<T: Service>(&self, instance: &Instance) -> Result<Arc<T>, ConstructionError> {
        instance
            .downcast::<T>()
            .ok_or_else(|| ConstructionError::TypeMismatch {
                key: self.owner.clone(),
                expected: core::any::type_name::<T>(),
                found: instance.type_name(),
            })
    }
}

/// Sequential reader over [`Dependencies`], used by closure factories.
pub struct DependencyCursor<'d, 'a> {
    dependencies: &'d Dependencies<'a>,
    next: usize,
}

impl DependencyCursor<'_, '_> {
    /// Returns the next dependency as a `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dependencies are exhausted or the value is not
    /// a `T`.
    pub fn next_value<T: Service>(&mut self) -> Result<Arc<T>, ConstructionError> {
        let index = self.next;
        self.next += 1;
        self.dependencies.get::<T>(index)
    }
}

/// A closure parameter that can be injected into a factory.
pub trait FactoryParam: Sized + 'static {
    /// The key this parameter depends on.
    fn key() -> Key;

    /// Reads the parameter from the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the dependency is missing or has the wrong type.
    fn fetch(cursor: &mut DependencyCursor<'_, '_>) -> Result<Self, ConstructionError>;
}

impl<T: Service> FactoryParam for Arc<T> {
    fn key() -> Key {
        Key::of::<T>()
    }

    fn fetch(cursor: &mut DependencyCursor<'_, '_>) -> Result<Self, ConstructionError> {
        cursor.next_value::<T>()
    }
}

/// A [`Factory`] backed by a closure over [`Dependencies`].
pub struct FnFactory<F> {
    func: F,
    name: &'static str,
}

impl<F> FnFactory<F>
where
    F: Fn(&Dependencies<'_>) -> Result<Instance, ConstructionError> + Send + Sync + 'static,
{
    /// Creates a factory with a debug name.
    pub fn new(func: F, name: &'static str) -> Self {
        Self { func, name }
    }
}

impl<F> Factory for FnFactory<F>
where
    F: Fn(&Dependencies<'_>) -> Result<Instance, ConstructionError> + Send + Sync + 'static,
{
    fn invoke(&self, dependencies: &Dependencies<'_>) -> Result<Instance, ConstructionError> {
        (self.func)(dependencies)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Builds a factory from a closure that reads its own dependencies.
///
/// Pair it with an explicit dependency key list when declaring the provider.
///
/// # Example
///
/// ```
/// use lodestar_service::factory::factory_fn;
/// use lodestar_service::key::Key;
///
/// let primary = Key::qualified::<String>("primary");
/// let greeting = factory_fn(move |deps| {
///     let name = deps.get_keyed::<String>(&primary)?;
///     Ok::<_, lodestar_service::error::ConstructionError>(format!("hello {name}"))
/// });
/// # let _ = greeting;
/// ```
pub fn factory_fn<T, E, F>(func: F) -> Arc<dyn Factory>
where
    T: Service,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
    F: Fn(&Dependencies<'_>) -> Result<T, E> + Send + Sync + 'static,
{
    let name = core::any::type_name::<F>();
    Arc::new(FnFactory::new(
        move |deps: &Dependencies<'_>| {
            func(deps)
                .map(Instance::new)
                .map_err(|err| into_construction_error(deps.owner(), err.into()))
        },
        name,
    ))
}

/// Keeps engine errors raised inside a factory intact instead of wrapping them.
fn into_construction_error(
    owner: &Key,
    error: Box<dyn std::error::Error + Send + Sync>,
) -> ConstructionError {
    match error.downcast::<ConstructionError>() {
        Ok(construction) => *construction,
        Err(other) => ConstructionError::failed(owner.clone(), other),
    }
}

/// Conversion of an infallible closure into a [`Factory`].
///
/// Implemented for `Fn(Arc<A>, Arc<B>, ..) -> T` with up to eight parameters.
pub trait IntoFactory<Marker>: Send + Sync + Sized + 'static {
    /// The produced value type.
    type Output: Service;

    /// The dependency keys derived from the parameter types.
    fn dependencies() -> Vec<Key>;

    /// Converts into a type-erased factory.
    fn into_factory(self) -> Arc<dyn Factory>;
}

/// Conversion of a fallible closure into a [`Factory`].
///
/// Implemented for `Fn(Arc<A>, ..) -> Result<T, E>` with up to eight
/// parameters, where `E` converts into a boxed error.
pub trait IntoTryFactory<Marker>: Send + Sync + Sized + 'static {
    /// The produced value type.
    type Output: Service;

    /// The dependency keys derived from the parameter types.
    fn dependencies() -> Vec<Key>;

    /// Converts into a type-erased factory.
    fn into_factory(self) -> Arc<dyn Factory>;
}

/// Marker for closure factories; the type parameter is the closure signature.
pub struct FnMarker<Signature>(PhantomData<Signature>);

impl<Func, Out> IntoFactory<FnMarker<fn() -> Out>> for Func
where
    Func: Fn() -> Out + Send + Sync + 'static,
    Out: Service,
{
    type Output = Out;

    fn dependencies() -> Vec<Key> {
        Vec::new()
    }

    fn into_factory(self) -> Arc<dyn Factory> {
        let name = core::any::type_name::<Func>();
        let func = self;
        Arc::new(FnFactory::new(
            move |_deps: &Dependencies<'_>| Ok(Instance::new(func())),
            name,
        ))
    }
}

impl<Func, Out, Err> IntoTryFactory<FnMarker<fn() -> Result<Out, Err>>> for Func
where
    Func: Fn() -> Result<Out, Err> + Send + Sync + 'static,
    Out: Service,
    Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Output = Out;

    fn dependencies() -> Vec<Key> {
        Vec::new()
    }

    fn into_factory(self) -> Arc<dyn Factory> {
        let name = core::any::type_name::<Func>();
        let func = self;
        Arc::new(FnFactory::new(
            move |deps: &Dependencies<'_>| {
                func()
                    .map(Instance::new)
                    .map_err(|err| into_construction_error(deps.owner(), err.into()))
            },
            name,
        ))
    }
}

// Closure factories with 1..=8 injected parameters
macro_rules! impl_into_factory {
    ($($param:ident),*) => {
        impl<Func, Out, $($param: FactoryParam),*> IntoFactory<FnMarker<fn($($param,)*) -> Out>>
            for Func
        where
            Func: Fn($($param),*) -> Out + Send + Sync + 'static,
            Out: Service,
        {
            type Output = Out;

            fn dependencies() -> Vec<Key> {
                vec![$($param::key()),*]
            }

            fn into_factory(self) -> Arc<dyn Factory> {
                let name = core::any::type_name::<Func>();
                let func = self;
                Arc::new(FnFactory::new(
                    move |deps: &Dependencies<'_>| {
                        let mut cursor = deps.cursor();
                        Ok(Instance::new(func($($param::fetch(&mut cursor)?),*)))
                    },
                    name,
                ))
            }
        }

        impl<Func, Out, Err, $($param: FactoryParam),*>
            IntoTryFactory<FnMarker<fn($($param,)*) -> Result<Out, Err>>> for Func
        where
            Func: Fn($($param),*) -> Result<Out, Err> + Send + Sync + 'static,
            Out: Service,
            Err: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            type Output = Out;

            fn dependencies() -> Vec<Key> {
                vec![$($param::key()),*]
            }

            fn into_factory(self) -> Arc<dyn Factory> {
                let name = core::any::type_name::<Func>();
                let func = self;
                Arc::new(FnFactory::new(
                    move |deps: &Dependencies<'_>| {
                        let mut cursor = deps.cursor();
                        func($($param::fetch(&mut cursor)?),*)
                            .map(Instance::new)
                            .map_err(|err| into_construction_error(deps.owner(), err.into()))
                    },
                    name,
                ))
            }
        }
    };
}

all_tuples!(impl_into_factory, 1, 8, P);
