//! identity tokens handed to the remote services.

/// supplies the opaque token a conversation identifies itself with.
/// the engine asks once, at construction, and reuses the value.
pub trait IdentityProvider {
    fn identity(&self) -> String;
}

/// a stable per-user id, e.g. the logged-in username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIdentity(pub String);

impl FixedIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl IdentityProvider for FixedIdentity {
    fn identity(&self) -> String {
        self.0.clone()
    }
}

/// anonymous visitors: a v4 uuid, generated once per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomIdentity(String);

impl RandomIdentity {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RandomIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for RandomIdentity {
    fn identity(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identity_is_stable_per_provider() {
        let a = RandomIdentity::new();
        let b = RandomIdentity::new();
        assert_eq!(a.identity(), a.identity());
        assert_ne!(a.identity(), b.identity());
        assert!(uuid::Uuid::parse_str(&a.identity()).is_ok());
    }

    #[test]
    fn fixed_identity_passes_through() {
        assert_eq!(FixedIdentity::new("ana").identity(), "ana");
    }
}
