//! Emplacements binaires et contenus associés à un asset

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Emplacement binaire d'un asset
///
/// L'ordre de déclaration est l'ordre d'itération de [`Slot::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Fichier du modèle (obligatoire à la création)
    Model,
    /// Vignette
    Thumbnail,
    /// Paquet secondaire (textures, etc.)
    Package,
    /// Archive d'origine
    Archive,
}

impl Slot {
    /// Les quatre emplacements connus
    pub const ALL: [Slot; 4] = [Slot::Model, Slot::Thumbnail, Slot::Package, Slot::Archive];

    /// Nom utilisé sur le fil (parties multipart) et en base
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Model => "model",
            Slot::Thumbnail => "thumbnail",
            Slot::Package => "package",
            Slot::Archive => "archive",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Slot::Model)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nom d'emplacement inconnu
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown payload slot: {0}")]
pub struct UnknownSlot(pub String);

impl FromStr for Slot {
    type Err = UnknownSlot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Slot::ALL
            .into_iter()
            .find(|slot| slot.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSlot(s.to_string()))
    }
}

/// Contenu binaire d'un emplacement
///
/// Un payload est immuable : une mise à jour le remplace entièrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Nom de fichier d'origine (transmis dans les parties multipart)
    pub file_name: String,
    /// Type MIME, s'il est connu
    pub content_type: Option<String>,
    /// Octets du fichier
    pub data: Bytes,
}

impl Payload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ensemble (éventuellement partiel) de payloads indexés par emplacement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSet {
    slots: BTreeMap<Slot, Payload>,
}

impl PayloadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construit un ensemble ne contenant que le fichier principal
    pub fn with_model(payload: Payload) -> Self {
        let mut set = Self::new();
        set.insert(Slot::Model, payload);
        set
    }

    pub fn insert(&mut self, slot: Slot, payload: Payload) -> Option<Payload> {
        self.slots.insert(slot, payload)
    }

    pub fn with(mut self, slot: Slot, payload: Payload) -> Self {
        self.insert(slot, payload);
        self
    }

    pub fn get(&self, slot: Slot) -> Option<&Payload> {
        self.slots.get(&slot)
    }

    pub fn remove(&mut self, slot: Slot) -> Option<Payload> {
        self.slots.remove(&slot)
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.slots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Payload)> {
        self.slots.iter().map(|(slot, payload)| (*slot, payload))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Taille cumulée des octets de tous les emplacements
    pub fn total_bytes(&self) -> usize {
        self.slots.values().map(Payload::len).sum()
    }

    /// Superpose cet ensemble à `previous`
    ///
    /// Les emplacements absents de `self` conservent la valeur de `previous`.
    pub fn merge_over(self, previous: PayloadSet) -> PayloadSet {
        let mut merged = previous;
        merged.slots.extend(self.slots);
        merged
    }
}

impl IntoIterator for PayloadSet {
    type Item = (Slot, Payload);
    type IntoIter = std::collections::btree_map::IntoIter<Slot, Payload>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

impl FromIterator<(Slot, Payload)> for PayloadSet {
    fn from_iter<T: IntoIterator<Item = (Slot, Payload)>>(iter: T) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_names_round_trip() {
        for slot in Slot::ALL {
            assert_eq!(slot.as_str().parse::<Slot>().unwrap(), slot);
        }
        assert_eq!("Thumbnail".parse::<Slot>().unwrap(), Slot::Thumbnail);
        assert!("texture".parse::<Slot>().is_err());
    }

    #[test]
    fn test_merge_over_keeps_unsupplied_slots() {
        let previous = PayloadSet::with_model(Payload::new("chair.glb", &b"model-v1"[..]))
            .with(Slot::Thumbnail, Payload::new("chair.png", &b"thumb-v1"[..]));
        let update = PayloadSet::new().with(Slot::Thumbnail, Payload::new("chair.webp", &b"thumb-v2"[..]));

        let merged = update.merge_over(previous);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(Slot::Model).unwrap().data, Bytes::from_static(b"model-v1"));
        assert_eq!(merged.get(Slot::Thumbnail).unwrap().data, Bytes::from_static(b"thumb-v2"));
        assert_eq!(merged.get(Slot::Thumbnail).unwrap().file_name, "chair.webp");
    }

    #[test]
    fn test_total_bytes() {
        let set = PayloadSet::with_model(Payload::new("a.glb", vec![0u8; 10]))
            .with(Slot::Archive, Payload::new("a.zip", vec![0u8; 5]));
        assert_eq!(set.total_bytes(), 15);
        assert_eq!(set.slots().collect::<Vec<_>>(), vec![Slot::Model, Slot::Archive]);
    }
}
