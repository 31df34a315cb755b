use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

/// A typed, `const`-constructible component identifier.
///
/// Tokens replace class identity as container and metadata keys: every
/// component is addressed by a stable string id, while the type parameter
/// keeps resolution type-safe.
///
/// # Example
/// ```
/// use trellis::token::Token;
///
/// struct UserService;
///
/// const USER_SERVICE: Token<UserService> = Token::new("UserService");
/// assert_eq!(USER_SERVICE.id(), "UserService");
/// ```
pub struct Token<T: ?Sized> {
    id: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> Token<T> {
    /// Create a token with the given stable identifier.
    pub const fn new(id: &'static str) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The stable string identifier of this token.
    pub const fn id(&self) -> &'static str {
        self.id
    }
}

impl<T: Send + Sync + 'static> Token<T> {
    /// Erase the type parameter, keeping the id and the `TypeId` for
    /// runtime checks. Used wherever tokens of different types are mixed,
    /// such as dependency declarations.
    pub fn erased(&self) -> DynToken {
        DynToken {
            id: self.id,
            type_id: TypeId::of::<T>(),
        }
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Token<T> {}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.id).finish()
    }
}

impl<T: ?Sized> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

/// A type-erased token: the stable id plus the `TypeId` of the component
/// it was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DynToken {
    id: &'static str,
    type_id: TypeId,
}

impl DynToken {
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl fmt::Display for DynToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ServiceA;
    struct ServiceB;

    const A: Token<ServiceA> = Token::new("ServiceA");
    const B: Token<ServiceB> = Token::new("ServiceB");

    #[test]
    fn test_token_id() {
        assert_eq!(A.id(), "ServiceA");
        assert_eq!(A.to_string(), "ServiceA");
    }

    #[test]
    fn test_erased_tokens_compare_by_id_and_type() {
        assert_eq!(A.erased(), A.erased());
        assert_ne!(A.erased(), B.erased());
    }
}
