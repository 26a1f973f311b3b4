use crate::query::normalize;
use crate::types::ProductRecord;
use std::collections::HashSet;

/// Free, local product data: the "mock" results served when the metered
/// upstream is skipped, refused, or comes back empty.
pub trait LocalCatalog: Send + Sync {
    /// Products that actually match `query`; may be empty.
    fn search(&self, query: &str, max_results: usize) -> Vec<ProductRecord>;

    /// Results to show when nothing better is available. Implementations
    /// should return something whenever `max_results > 0`.
    fn fallback(&self, query: &str, max_results: usize) -> Vec<ProductRecord> {
        self.search(query, max_results)
    }

    fn name(&self) -> &'static str {
        "local_catalog"
    }
}

struct CatalogItem {
    record: ProductRecord,
    terms: HashSet<String>,
}

type Row = (&'static str, &'static str, f64, &'static str, &'static str, f32, &'static [&'static str]);

const BUILTIN: &[Row] = &[
    ("cat-001", "Wireless Noise Cancelling Headphones", 199.0, "Sonora", "electronics", 4.7, &["headphones", "audio", "music", "wireless"]),
    ("cat-002", "Over-Ear Studio Headphones", 129.0, "Sonora", "electronics", 4.5, &["headphones", "audio", "music"]),
    ("cat-003", "True Wireless Earbuds", 89.0, "Pulse", "electronics", 4.4, &["headphones", "earbuds", "audio", "wireless"]),
    ("cat-004", "Kids Volume-Limited Headphones", 34.0, "Pulse", "electronics", 4.3, &["headphones", "kids", "audio"]),
    ("cat-005", "Sport Bone-Conduction Headphones", 119.0, "Stride", "electronics", 4.2, &["headphones", "sports", "running", "audio"]),
    ("cat-006", "Portable Bluetooth Speaker", 59.0, "Pulse", "electronics", 4.6, &["speaker", "audio", "music", "wireless"]),
    ("cat-007", "Smart Fitness Watch", 179.0, "Stride", "electronics", 4.4, &["watch", "fitness", "sports", "smartwatch"]),
    ("cat-008", "Instant Print Camera", 79.0, "Lumo", "electronics", 4.5, &["camera", "photo"]),
    ("cat-009", "Leather Bifold Wallet", 45.0, "Hartwell", "fashion", 4.6, &["wallet", "leather", "men"]),
    ("cat-010", "Cashmere Blend Scarf", 65.0, "Hartwell", "fashion", 4.7, &["scarf", "winter", "women"]),
    ("cat-011", "Classic Canvas Sneakers", 55.0, "Stride", "fashion", 4.3, &["sneakers", "shoes", "trainers"]),
    ("cat-012", "Minimalist Analog Watch", 120.0, "Hartwell", "fashion", 4.5, &["watch", "men", "women"]),
    ("cat-013", "Sterling Silver Pendant Necklace", 89.0, "Aurelle", "jewelry", 4.8, &["necklace", "silver", "pendant", "women"]),
    ("cat-014", "Birthstone Stud Earrings", 49.0, "Aurelle", "jewelry", 4.6, &["earrings", "birthstone", "women"]),
    ("cat-015", "Engraved Cufflinks", 39.0, "Hartwell", "jewelry", 4.4, &["cufflinks", "men", "engraved", "personalized"]),
    ("cat-016", "Skincare Discovery Set", 42.0, "Bloom", "beauty", 4.5, &["skincare", "spa", "women"]),
    ("cat-017", "Aromatherapy Diffuser", 35.0, "Bloom", "beauty", 4.4, &["diffuser", "aromatherapy", "relaxation", "spa"]),
    ("cat-018", "Luxury Bath Bomb Collection", 24.0, "Bloom", "beauty", 4.6, &["bath", "spa", "relaxation"]),
    ("cat-019", "Hand-Poured Soy Candle Trio", 32.0, "Hearth", "home_decor", 4.7, &["candle", "candles", "home", "relaxation"]),
    ("cat-020", "Ceramic Coffee Mug Set", 28.0, "Hearth", "home_decor", 4.5, &["mug", "cup", "coffee", "kitchen"]),
    ("cat-021", "Custom Photo Frame", 30.0, "Hearth", "home_decor", 4.3, &["frame", "photo", "personalized"]),
    ("cat-022", "Weighted Knit Blanket", 95.0, "Hearth", "home_decor", 4.8, &["blanket", "home", "cozy"]),
    ("cat-023", "STEM Robot Building Kit", 49.0, "Tinker", "toys", 4.6, &["robot", "stem", "kids", "toy"]),
    ("cat-024", "Plush Teddy Bear", 25.0, "Tinker", "toys", 4.8, &["teddy", "bear", "plush", "kids", "toy"]),
    ("cat-025", "1000-Piece Jigsaw Puzzle", 22.0, "Tinker", "toys", 4.5, &["puzzle", "game", "family"]),
    ("cat-026", "Bestselling Mystery Box Set", 38.0, "Inkwell", "books", 4.6, &["book", "books", "mystery", "reading"]),
    ("cat-027", "Illustrated Cookbook", 29.0, "Inkwell", "books", 4.7, &["book", "cookbook", "cooking", "kitchen"]),
    ("cat-028", "Yoga Mat and Strap Set", 48.0, "Stride", "sports", 4.5, &["yoga", "fitness", "sports"]),
    ("cat-029", "Insulated Water Bottle", 27.0, "Stride", "sports", 4.6, &["bottle", "hiking", "fitness", "sports"]),
    ("cat-030", "Artisan Chocolate Tasting Box", 36.0, "Cacao House", "gourmet", 4.8, &["chocolate", "gourmet", "food", "sweets"]),
    ("cat-031", "Single-Origin Coffee Sampler", 34.0, "Cacao House", "gourmet", 4.6, &["coffee", "gourmet", "food"]),
    ("cat-032", "Cooking Class Experience", 85.0, "Outings", "experiences", 4.7, &["experience", "cooking", "class"]),
    ("cat-033", "Spa Day Voucher", 120.0, "Outings", "experiences", 4.8, &["experience", "spa", "relaxation"]),
    ("cat-034", "Personalized Pet Portrait", 60.0, "Pawprint", "pets", 4.9, &["pet", "dog", "cat", "portrait", "personalized"]),
    ("cat-035", "Interactive Dog Puzzle Toy", 19.0, "Pawprint", "pets", 4.4, &["dog", "pet", "toy", "puzzle"]),
];

const GENERIC: &[(&str, f64)] = &[
    ("Gift Card", 50.0),
    ("Curated Gift Box", 45.0),
    ("Personalized Keepsake", 35.0),
    ("Deluxe Gift Set", 60.0),
    ("Starter Kit", 30.0),
    ("Subscription Box", 40.0),
];

/// A fixed gift catalog matched by token overlap.
///
/// Tokens are compared against title words and tags, with a trailing plural
/// `s` ignored. When nothing overlaps, [`fallback`](LocalCatalog::fallback)
/// synthesizes generic gift suggestions named after the query.
pub struct StaticCatalog {
    items: Vec<CatalogItem>,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn stem(token: &str) -> &str {
    match token.strip_suffix('s') {
        Some(rest) if rest.len() >= 3 => rest,
        _ => token,
    }
}

impl StaticCatalog {
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (id, title, price, brand, category, rating, tags) in BUILTIN {
            let record = ProductRecord::new(*id, *title)
                .with_price(*price)
                .with_brand(*brand)
                .with_category(*category)
                .with_rating(*rating)
                .with_merchant("Giftwise Picks");
            catalog.insert(record, tags.iter().copied());
        }
        catalog
    }

    pub fn insert<'a>(&mut self, record: ProductRecord, tags: impl IntoIterator<Item = &'a str>) {
        let mut terms: HashSet<String> = normalize(&record.title)
            .split_whitespace()
            .map(|w| stem(w).to_string())
            .collect();
        for tag in tags {
            for w in normalize(tag).split_whitespace() {
                terms.insert(stem(w).to_string());
            }
        }
        if let Some(category) = &record.category {
            terms.insert(stem(&normalize(category)).to_string());
        }
        self.items.push(CatalogItem { record, terms });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn matches(&self, query: &str, max_results: usize) -> Vec<ProductRecord> {
        let normalized = normalize(query);
        let tokens: Vec<&str> = normalized.split_whitespace().map(stem).collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &CatalogItem)> = self
            .items
            .iter()
            .filter_map(|item| {
                let score = tokens.iter().filter(|t| item.terms.contains(**t)).count();
                (score > 0).then_some((score, item))
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa).then_with(|| {
                let ra = a.record.rating.unwrap_or(0.0);
                let rb = b.record.rating.unwrap_or(0.0);
                rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        scored
            .into_iter()
            .take(max_results)
            .map(|(_, item)| item.record.clone())
            .collect()
    }

    fn synthesize(query: &str, max_results: usize) -> Vec<ProductRecord> {
        let normalized = normalize(query);
        let subject = if normalized.is_empty() {
            "Gift".to_string()
        } else {
            let mut chars = normalized.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "Gift".to_string(),
            }
        };
        let slug = normalized.replace(' ', "-");
        GENERIC
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(i, (suffix, price))| {
                ProductRecord::new(format!("gen-{slug}-{i}"), format!("{subject} {suffix}"))
                    .with_price(*price)
                    .with_category("gift-ideas")
                    .with_merchant("Giftwise Picks")
            })
            .collect()
    }
}

impl LocalCatalog for StaticCatalog {
    fn search(&self, query: &str, max_results: usize) -> Vec<ProductRecord> {
        self.matches(query, max_results)
    }

    fn fallback(&self, query: &str, max_results: usize) -> Vec<ProductRecord> {
        let found = self.matches(query, max_results);
        if found.is_empty() {
            Self::synthesize(query, max_results)
        } else {
            found
        }
    }

    fn name(&self) -> &'static str {
        "static_catalog"
    }
}
