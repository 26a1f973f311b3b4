use crate::query::normalize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported category. Anything unrecognized is [`CategoryKey::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKey {
    Electronics,
    Fashion,
    HomeDecor,
    Beauty,
    Toys,
    Books,
    Sports,
    Jewelry,
    Gourmet,
    Experiences,
    Pets,
    Default,
}

impl CategoryKey {
    pub const ALL: [CategoryKey; 12] = [
        CategoryKey::Electronics,
        CategoryKey::Fashion,
        CategoryKey::HomeDecor,
        CategoryKey::Beauty,
        CategoryKey::Toys,
        CategoryKey::Books,
        CategoryKey::Sports,
        CategoryKey::Jewelry,
        CategoryKey::Gourmet,
        CategoryKey::Experiences,
        CategoryKey::Pets,
        CategoryKey::Default,
    ];

    /// Lenient parse: case, punctuation and a few common aliases are accepted.
    pub fn parse(raw: &str) -> Self {
        let key = normalize(&raw.replace(['-', ' '], "_"));
        match key.as_str() {
            "electronics" | "tech" | "gadgets" => CategoryKey::Electronics,
            "fashion" | "clothing" | "apparel" | "accessories" => CategoryKey::Fashion,
            "home_decor" | "homedecor" | "home" | "decor" => CategoryKey::HomeDecor,
            "beauty" | "skincare" | "cosmetics" => CategoryKey::Beauty,
            "toys" | "kids" | "games" => CategoryKey::Toys,
            "books" | "reading" => CategoryKey::Books,
            "sports" | "fitness" | "outdoors" => CategoryKey::Sports,
            "jewelry" | "jewellery" => CategoryKey::Jewelry,
            "gourmet" | "food" | "food_drink" => CategoryKey::Gourmet,
            "experiences" | "experience" => CategoryKey::Experiences,
            "pets" | "pet" => CategoryKey::Pets,
            _ => CategoryKey::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKey::Electronics => "electronics",
            CategoryKey::Fashion => "fashion",
            CategoryKey::HomeDecor => "home_decor",
            CategoryKey::Beauty => "beauty",
            CategoryKey::Toys => "toys",
            CategoryKey::Books => "books",
            CategoryKey::Sports => "sports",
            CategoryKey::Jewelry => "jewelry",
            CategoryKey::Gourmet => "gourmet",
            CategoryKey::Experiences => "experiences",
            CategoryKey::Pets => "pets",
            CategoryKey::Default => "default",
        }
    }

    pub fn strategy(&self) -> &'static CategoryStrategy {
        STRATEGIES
            .iter()
            .find(|s| s.key == *self)
            .unwrap_or(&DEFAULT_STRATEGY)
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a category is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum SearchMethod {
    /// Plain keyword search against the metered upstream.
    Default,
    /// Metered keyword search with category keywords appended to the term.
    Scoped { keywords: &'static str },
    /// Local catalog picks only; never billed.
    Curated { keywords: &'static str },
}

impl SearchMethod {
    /// The query actually sent for `term`. An empty term searches the keywords alone.
    pub fn compose(&self, term: &str) -> String {
        let term = term.trim();
        match self {
            SearchMethod::Default => term.to_string(),
            SearchMethod::Scoped { keywords } | SearchMethod::Curated { keywords } => {
                if term.is_empty() {
                    keywords.to_string()
                } else {
                    format!("{term} {keywords}")
                }
            }
        }
    }

    pub fn is_metered(&self) -> bool {
        !matches!(self, SearchMethod::Curated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryStrategy {
    pub key: CategoryKey,
    pub method: SearchMethod,
    /// Sent through [`SearchMethod::Default`] when the primary attempt fails.
    pub fallback_query: &'static str,
    /// Inactive categories skip the primary attempt.
    pub is_active: bool,
}

const fn scoped(
    key: CategoryKey,
    keywords: &'static str,
    fallback_query: &'static str,
) -> CategoryStrategy {
    CategoryStrategy {
        key,
        method: SearchMethod::Scoped { keywords },
        fallback_query,
        is_active: true,
    }
}

const DEFAULT_STRATEGY: CategoryStrategy = CategoryStrategy {
    key: CategoryKey::Default,
    method: SearchMethod::Default,
    fallback_query: "popular gifts",
    is_active: true,
};

static STRATEGIES: [CategoryStrategy; 12] = [
    scoped(CategoryKey::Electronics, "electronics gadgets", "popular tech gadgets"),
    scoped(CategoryKey::Fashion, "fashion accessories", "trending fashion accessories"),
    scoped(CategoryKey::HomeDecor, "home decor", "cozy home decor gifts"),
    scoped(CategoryKey::Beauty, "beauty skincare", "beauty gift sets"),
    scoped(CategoryKey::Toys, "toys", "best toys for kids"),
    scoped(CategoryKey::Books, "books", "bestselling books"),
    scoped(CategoryKey::Sports, "sports fitness", "fitness gear gifts"),
    scoped(CategoryKey::Jewelry, "jewelry", "jewelry gifts"),
    scoped(CategoryKey::Gourmet, "gourmet food", "gourmet gift baskets"),
    CategoryStrategy {
        key: CategoryKey::Experiences,
        method: SearchMethod::Curated {
            keywords: "experience",
        },
        fallback_query: "experience gifts",
        is_active: true,
    },
    CategoryStrategy {
        key: CategoryKey::Pets,
        method: SearchMethod::Scoped {
            keywords: "pet supplies",
        },
        fallback_query: "gifts for pet lovers",
        is_active: false,
    },
    DEFAULT_STRATEGY,
];

/// The whole strategy table, one entry per [`CategoryKey`].
pub fn strategies() -> &'static [CategoryStrategy] {
    &STRATEGIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases_and_defaults() {
        assert_eq!(CategoryKey::parse("Electronics"), CategoryKey::Electronics);
        assert_eq!(CategoryKey::parse("home-decor"), CategoryKey::HomeDecor);
        assert_eq!(CategoryKey::parse("Home Decor"), CategoryKey::HomeDecor);
        assert_eq!(CategoryKey::parse("jewellery"), CategoryKey::Jewelry);
        assert_eq!(CategoryKey::parse("spaceships"), CategoryKey::Default);
        assert_eq!(CategoryKey::parse(""), CategoryKey::Default);
    }

    #[test]
    fn every_key_has_exactly_one_strategy() {
        for key in CategoryKey::ALL {
            assert_eq!(strategies().iter().filter(|s| s.key == key).count(), 1);
            assert_eq!(key.strategy().key, key);
            assert_eq!(CategoryKey::parse(key.as_str()), key);
        }
    }

    #[test]
    fn compose_appends_keywords() {
        let m = CategoryKey::Electronics.strategy().method;
        assert_eq!(m.compose("smart watch"), "smart watch electronics gadgets");
        assert_eq!(m.compose("  "), "electronics gadgets");
        assert_eq!(SearchMethod::Default.compose(" lego "), "lego");
        assert!(!CategoryKey::Experiences.strategy().method.is_metered());
    }
}
