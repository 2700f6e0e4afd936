//! Name → handler registration table.
//!
//! Built once at startup and shared immutably (`Arc<Registry>`) by every
//! connection. Names are resolved per envelope; factories take no arguments,
//! so per-instance setup happens in `Action::initialize`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Capability, RegistryError};

use super::action::Action;
use super::broadcast::{BroadcastPolicy, PolicyRef};
use super::policies;
use super::state::StateGenerator;

type StateFactory = Arc<dyn Fn() -> Box<dyn StateGenerator> + Send + Sync>;
type ActionFactory = Arc<dyn Fn() -> Box<dyn Action> + Send + Sync>;

enum Entry {
    State(StateFactory),
    Action(ActionFactory),
    Policy(PolicyRef),
}

impl Entry {
    fn capability(&self) -> Capability {
        match self {
            Entry::State(_) => Capability::State,
            Entry::Action(_) => Capability::Action,
            Entry::Policy(_) => Capability::Policy,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
    /// State object kind → policies it fans out to, in association order.
    associations: HashMap<String, Vec<PolicyRef>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Fresh state generator instance for `name`.
    pub fn resolve_state(&self, name: &str) -> Result<Box<dyn StateGenerator>, RegistryError> {
        match self.lookup(name)? {
            Entry::State(factory) => Ok(factory()),
            other => Err(mismatch(name, Capability::State, other)),
        }
    }

    /// Fresh, uninitialized action instance for `name`.
    pub fn resolve_action(&self, name: &str) -> Result<Box<dyn Action>, RegistryError> {
        match self.lookup(name)? {
            Entry::Action(factory) => Ok(factory()),
            other => Err(mismatch(name, Capability::Action, other)),
        }
    }

    pub fn policy(&self, name: &str) -> Result<PolicyRef, RegistryError> {
        match self.lookup(name)? {
            Entry::Policy(policy) => Ok(policy.clone()),
            other => Err(mismatch(name, Capability::Policy, other)),
        }
    }

    /// Policies associated with a state object kind. Empty if none.
    pub fn policies_for(&self, kind: &str) -> &[PolicyRef] {
        self.associations
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn lookup(&self, name: &str) -> Result<&Entry, RegistryError> {
        self.entries.get(name).ok_or_else(|| RegistryError::UnknownName {
            name: name.to_string(),
        })
    }
}

fn mismatch(name: &str, expected: Capability, found: &Entry) -> RegistryError {
    RegistryError::TypeMismatch {
        name: name.to_string(),
        expected,
        found: found.capability(),
    }
}

/// Populates a [`Registry`]. Methods chain through `?`:
///
/// ```ignore
/// let mut builder = Registry::builder();
/// builder
///     .with_builtin_policies()?
///     .register_state("NewComment", NewComment::default)?
///     .associate("Comment", "everyone")?;
/// let registry = builder.build();
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn register_state<G, F>(&mut self, name: impl Into<String>, factory: F) -> Result<&mut Self, RegistryError>
    where
        G: StateGenerator + 'static,
        F: Fn() -> G + Send + Sync + 'static,
    {
        let factory: StateFactory = Arc::new(move || Box::new(factory()) as Box<dyn StateGenerator>);
        self.insert(name.into(), Entry::State(factory))
    }

    pub fn register_action<A, F>(&mut self, name: impl Into<String>, factory: F) -> Result<&mut Self, RegistryError>
    where
        A: Action + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let factory: ActionFactory = Arc::new(move || Box::new(factory()) as Box<dyn Action>);
        self.insert(name.into(), Entry::Action(factory))
    }

    pub fn register_policy(
        &mut self,
        name: impl Into<String>,
        policy: impl BroadcastPolicy,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        let policy = PolicyRef::new(name.as_str(), policy);
        self.insert(name, Entry::Policy(policy))
    }

    /// Fan state objects of `kind` out to the registered policy `policy_name`.
    /// The policy must already be registered.
    pub fn associate(&mut self, kind: impl Into<String>, policy_name: &str) -> Result<&mut Self, RegistryError> {
        let policy = self.registry.policy(policy_name)?;
        self.registry
            .associations
            .entry(kind.into())
            .or_default()
            .push(policy);
        Ok(self)
    }

    /// Register the policies in [`policies`] under their standard names.
    pub fn with_builtin_policies(&mut self) -> Result<&mut Self, RegistryError> {
        self.register_policy(policies::EVERYONE, policies::EveryonePolicy)?
            .register_policy(policies::AUTHENTICATED, policies::AuthenticatedPolicy)?
            .register_policy(policies::USER, policies::UserPolicy)
    }

    pub fn build(self) -> Registry {
        self.registry
    }

    fn insert(&mut self, name: String, entry: Entry) -> Result<&mut Self, RegistryError> {
        if self.registry.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.registry.entries.insert(name, entry);
        Ok(self)
    }
}
