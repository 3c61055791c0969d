//! Structures de données représentant un asset du catalogue

use crate::payload::Slot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Désérialiseur flexible pour les IDs qui peuvent être des strings ou des integers
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::custom("ID must be a string or number")),
    }
}

/// Génère un identifiant d'asset côté client
pub fn new_asset_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Formate une taille en octets de manière lisible (`"1.4 MB"`)
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Métadonnées structurelles d'un modèle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    /// Nombre de sommets
    #[serde(default)]
    pub vertices: u64,
    /// Nombre de polygones
    #[serde(default)]
    pub polygons: u64,
    /// Nombre de matériaux
    #[serde(default)]
    pub materials: u64,
    /// Date de création du modèle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Références (URLs) vers les ressources binaires d'un asset
///
/// Côté distant ce sont des chemins relatifs (`/uploads/x.glb`), réécrits en
/// URLs absolues par le client du catalogue avant de remonter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
}

impl ResourceRefs {
    pub fn get(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Model => self.model_url.as_deref(),
            Slot::Thumbnail => self.thumbnail_url.as_deref(),
            Slot::Package => self.package_url.as_deref(),
            Slot::Archive => self.archive_url.as_deref(),
        }
    }

    pub fn set(&mut self, slot: Slot, url: Option<String>) {
        let target = match slot {
            Slot::Model => &mut self.model_url,
            Slot::Thumbnail => &mut self.thumbnail_url,
            Slot::Package => &mut self.package_url,
            Slot::Archive => &mut self.archive_url,
        };
        *target = url;
    }

    /// Applique `f` à chaque URL présente
    pub fn map_urls(&mut self, mut f: impl FnMut(&str) -> String) {
        for slot in Slot::ALL {
            if let Some(url) = self.get(slot) {
                let mapped = f(url);
                self.set(slot, Some(mapped));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.iter().all(|slot| self.get(*slot).is_none())
    }
}

/// Représente un asset (modèle 3D) du catalogue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Identifiant unique, immuable après création
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Nom affiché
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Identifiant de catégorie
    #[serde(default)]
    pub category: String,
    /// Tags, dans l'ordre d'affichage
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: AssetMetadata,
    /// Taille lisible du fichier principal (`"2.3 MB"`)
    #[serde(default)]
    pub file_size: String,
    /// Drapeau de rendu
    #[serde(default)]
    pub rendered: bool,
    #[serde(flatten)]
    pub resources: ResourceRefs,
}

impl Asset {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Mise à jour partielle des métadonnées d'un asset
///
/// Les champs à `None` ne sont ni envoyés au catalogue ni appliqués localement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<bool>,
}

impl AssetPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Default::default()
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn rendered(rendered: bool) -> Self {
        Self {
            rendered: Some(rendered),
            ..Default::default()
        }
    }

    /// Patch complet reprenant toutes les métadonnées éditables de `asset`
    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            name: Some(asset.name.clone()),
            description: Some(asset.description.clone()),
            category: Some(asset.category.clone()),
            tags: Some(asset.tags.clone()),
            rendered: Some(asset.rendered),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.rendered.is_none()
    }

    pub fn apply_to(&self, asset: &mut Asset) {
        if let Some(name) = &self.name {
            asset.name = name.clone();
        }
        if let Some(description) = &self.description {
            asset.description = description.clone();
        }
        if let Some(category) = &self.category {
            asset.category = category.clone();
        }
        if let Some(tags) = &self.tags {
            asset.tags = tags.clone();
        }
        if let Some(rendered) = self.rendered {
            asset.rendered = rendered;
        }
    }
}
