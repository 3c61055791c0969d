//! Handles de ressources et table de résolution

use mvasset::Payload;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Préfixe des handles émis par ce processus
pub const HANDLE_PREFIX: &str = "blob:modelvault/";

/// Référence locale au processus désignant un binaire comme une ressource réseau
///
/// La valeur est régénérée à chaque création : elle n'est pas stable d'une
/// session à l'autre et ne doit jamais être persistée.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    pub(crate) fn generate() -> Self {
        Handle(format!("{}{}", HANDLE_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Vrai si `value` a la forme d'un handle émis par ce module
    pub fn is_handle(value: &str) -> bool {
        value.starts_with(HANDLE_PREFIX)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Table des handles vivants et des binaires qu'ils désignent
///
/// Seul [`crate::HandleCache`] enregistre et révoque ; les consommateurs ne
/// font que résoudre.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    bindings: RwLock<HashMap<String, Payload>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, handle: &Handle, payload: Payload) {
        let mut bindings = self.bindings.write().unwrap_or_else(|p| p.into_inner());
        bindings.insert(handle.0.clone(), payload);
    }

    pub(crate) fn revoke(&self, handle: &Handle) -> bool {
        let mut bindings = self.bindings.write().unwrap_or_else(|p| p.into_inner());
        bindings.remove(&handle.0).is_some()
    }

    pub(crate) fn revoke_everything(&self) -> usize {
        let mut bindings = self.bindings.write().unwrap_or_else(|p| p.into_inner());
        let count = bindings.len();
        bindings.clear();
        count
    }

    /// Binaire désigné par `handle`, `None` s'il a été révoqué
    pub fn resolve(&self, handle: &str) -> Option<Payload> {
        let bindings = self.bindings.read().unwrap_or_else(|p| p.into_inner());
        bindings.get(handle).cloned()
    }

    pub fn contains(&self, handle: &str) -> bool {
        let bindings = self.bindings.read().unwrap_or_else(|p| p.into_inner());
        bindings.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        let bindings = self.bindings.read().unwrap_or_else(|p| p.into_inner());
        bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
