use crate::error::{Result, TrellisError};
use crate::token::{DynToken, Token};
use dashmap::DashMap;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A shared, type-erased singleton instance.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

type CtorFn = Arc<dyn Fn(&Deps) -> Result<AnyInstance> + Send + Sync>;
type BindingFn = Arc<dyn Fn(&Container) -> Result<AnyInstance> + Send + Sync>;

/// A component definition: the ordered dependency tokens plus the
/// constructor invoked with the resolved set.
struct Definition {
    deps: Vec<DynToken>,
    ctor: CtorFn,
}

enum Entry {
    /// Resolution in progress. Used to detect re-entrant resolution;
    /// there is exactly one logical thread of control, so this never
    /// coordinates concurrent callers.
    Pending,
    Resolved(AnyInstance),
}

/// The resolved dependency set handed to component constructors.
///
/// Constructors fetch each declared dependency by its token. Asking for a
/// token that was not declared fails with `DependencyNotFound`.
#[derive(Default, Clone)]
pub struct Deps {
    values: HashMap<&'static str, AnyInstance>,
}

impl Deps {
    pub(crate) fn insert(&mut self, id: &'static str, value: AnyInstance) {
        self.values.insert(id, value);
    }

    pub fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Result<Arc<T>> {
        let value = self
            .values
            .get(token.id())
            .ok_or_else(|| TrellisError::DependencyNotFound {
                token: token.id().to_string(),
            })?;
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| TrellisError::DowncastFailed {
                token: token.id().to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Dependency injection container.
///
/// Components are registered under [`Token`]s with an explicit dependency
/// declaration ([`Container::define`]), a factory override
/// ([`Container::bind`]) or a prebuilt instance ([`Container::set`]).
/// Resolution is lazy, recursive and memoized: every component is
/// constructed at most once and lives for the rest of the process.
///
/// Cloning the container shares the underlying state.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use trellis::container::Container;
/// use trellis::token::Token;
///
/// struct Greeter;
/// const GREETER: Token<Greeter> = Token::new("Greeter");
///
/// let container = Container::new();
/// container.define(&GREETER, &[], |_| Ok(Greeter));
/// let greeter = container.resolve(&GREETER).unwrap();
/// assert!(Arc::ptr_eq(&greeter, &container.resolve(&GREETER).unwrap()));
/// ```
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

#[derive(Default)]
struct ContainerInner {
    entries: DashMap<&'static str, Entry>,
    definitions: DashMap<&'static str, Definition>,
    bindings: DashMap<&'static str, BindingFn>,
    /// Tokens currently mid-resolution, in request order. Backs both
    /// cycle detection and the chain named by the cycle error.
    resolving: Mutex<Vec<&'static str>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component definition: an ordered list of dependency
    /// tokens and a constructor receiving the resolved set.
    pub fn define<T, F>(&self, token: &Token<T>, deps: &[DynToken], ctor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Deps) -> Result<T> + Send + Sync + 'static,
    {
        let definition = Definition {
            deps: deps.to_vec(),
            ctor: Arc::new(move |resolved| Ok(Arc::new(ctor(resolved)?) as AnyInstance)),
        };
        self.inner.definitions.insert(token.id(), definition);
    }

    /// Override resolution of a token with a factory. The factory gets the
    /// container itself and fully replaces constructor resolution: declared
    /// dependencies of the token are never touched.
    pub fn bind<T, F>(&self, token: &Token<T>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        let binding: BindingFn =
            Arc::new(move |container| Ok(Arc::new(factory(container)?) as AnyInstance));
        self.inner.bindings.insert(token.id(), binding);
    }

    /// Manually register an instance. Subsequent `resolve`/`get` calls
    /// return it verbatim.
    pub fn set<T: Send + Sync + 'static>(&self, token: &Token<T>, instance: Arc<T>) {
        self.store(token.id(), instance);
    }

    /// Type-erased variant of [`Container::set`]. Fails with
    /// `DowncastFailed` when the supplied value is not an instance of the
    /// token's type.
    pub fn set_dyn(&self, token: &DynToken, instance: AnyInstance) -> Result<()> {
        if (*instance).type_id() != token.type_id() {
            return Err(TrellisError::DowncastFailed {
                token: token.id().to_string(),
            });
        }
        self.store(token.id(), instance);
        Ok(())
    }

    /// Resolve the singleton for a token, constructing it (and its
    /// transitive dependencies) on first request.
    pub fn resolve<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Result<Arc<T>> {
        self.resolve_raw(&token.erased())?
            .downcast::<T>()
            .map_err(|_| TrellisError::DowncastFailed {
                token: token.id().to_string(),
            })
    }

    pub(crate) fn resolve_raw(&self, token: &DynToken) -> Result<AnyInstance> {
        let id = token.id();
        if let Some(instance) = self.lookup_resolved(id) {
            return Ok(instance);
        }

        {
            let mut resolving = self
                .inner
                .resolving
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if resolving.contains(&id) {
                let mut chain = resolving.join(" -> ");
                chain.push_str(" -> ");
                chain.push_str(id);
                return Err(TrellisError::CircularDependency { chain });
            }
            resolving.push(id);
            self.inner.entries.insert(id, Entry::Pending);
        }

        let instance = if let Some(binding) = self.binding_for(id) {
            binding(self)?
        } else if let Some((dep_tokens, ctor)) = self.definition_for(id) {
            let mut deps = Deps::default();
            for dep in &dep_tokens {
                deps.insert(dep.id(), self.resolve_raw(dep)?);
            }
            ctor(&deps)?
        } else {
            return Err(TrellisError::DependencyNotFound {
                token: id.to_string(),
            });
        };

        self.store(id, instance.clone());
        Ok(instance)
    }

    /// Return an already-resolved instance. Unlike [`Container::resolve`]
    /// this never constructs anything.
    pub fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Result<Arc<T>> {
        match self.lookup_resolved(token.id()) {
            Some(instance) => {
                instance
                    .downcast::<T>()
                    .map_err(|_| TrellisError::DowncastFailed {
                        token: token.id().to_string(),
                    })
            }
            None => Err(TrellisError::InstanceNotFound {
                token: token.id().to_string(),
            }),
        }
    }

    /// Whether the token has a resolved instance.
    pub fn has(&self, id: &'static str) -> bool {
        self.lookup_resolved(id).is_some()
    }

    /// Tokens with a resolved instance.
    pub fn resolved_tokens(&self) -> Vec<&'static str> {
        self.inner
            .entries
            .iter()
            .filter(|entry| matches!(entry.value(), Entry::Resolved(_)))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Tokens currently mid-resolution, in request order.
    pub fn waiting_tokens(&self) -> Vec<&'static str> {
        self.inner
            .resolving
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.resolved_tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, id: &'static str, instance: AnyInstance) {
        self.inner.entries.insert(id, Entry::Resolved(instance));
        let mut resolving = self
            .inner
            .resolving
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(position) = resolving.iter().position(|pending| *pending == id) {
            resolving.remove(position);
        }
    }

    fn lookup_resolved(&self, id: &'static str) -> Option<AnyInstance> {
        self.inner.entries.get(id).and_then(|entry| match entry.value() {
            Entry::Resolved(instance) => Some(instance.clone()),
            Entry::Pending => None,
        })
    }

    fn binding_for(&self, id: &'static str) -> Option<BindingFn> {
        self.inner.bindings.get(id).map(|binding| binding.value().clone())
    }

    fn definition_for(&self, id: &'static str) -> Option<(Vec<DynToken>, CtorFn)> {
        self.inner
            .definitions
            .get(id)
            .map(|definition| (definition.deps.clone(), definition.ctor.clone()))
    }
}
