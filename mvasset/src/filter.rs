//! Filtrage de la liste d'assets côté appelant
//!
//! Le cache local n'a pas de langage de requête : les vues filtrent et trient
//! l'instantané en mémoire avec ces fonctions.

use crate::models::Asset;

/// Critères de filtrage
#[derive(Debug, Clone, Default)]
pub struct AssetQuery {
    /// Texte recherché (insensible à la casse) dans le nom, la description et les tags
    pub text: Option<String>,
    /// Catégorie exacte
    pub category: Option<String>,
    /// Tags requis (tous doivent être présents)
    pub tags: Vec<String>,
}

impl AssetQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        if let Some(category) = &self.category {
            if &asset.category != category {
                return false;
            }
        }

        let has_tag = |wanted: &String| asset.tags.iter().any(|t| t.eq_ignore_ascii_case(wanted));
        if !self.tags.iter().all(has_tag) {
            return false;
        }

        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(text) => {
                let needle = text.to_lowercase();
                asset.name.to_lowercase().contains(&needle)
                    || asset.description.to_lowercase().contains(&needle)
                    || asset.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Retourne les assets correspondant à `query`, triés par nom
pub fn filter_assets(assets: &[Asset], query: &AssetQuery) -> Vec<Asset> {
    let mut result: Vec<Asset> = assets.iter().filter(|a| query.matches(a)).cloned().collect();
    result.sort_by_key(|a| a.name.to_lowercase());
    result
}
