//! Prize catalog and the weighted draw engine
//!
//! One case open performs exactly one uniform draw in [0, 1) and resolves it
//! against a cumulative rarity table. The original service issued an
//! independent `random() < threshold` comparison per tier, which does not
//! produce the advertised marginal probabilities; the cumulative table does,
//! so that construction is used here.

use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};

/// Редкость приза. Закрытый упорядоченный набор: Common < Rare < Epic <
/// Legendary < Mythic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
    Mythic,
}

impl Rarity {
    /// All tiers in ascending order, matching the cumulative table below.
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
        Rarity::Mythic,
    ];

    /// Lowercase label used in SQLite rows and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
            Rarity::Mythic => "mythic",
        }
    }

    /// Parse the lowercase label back from storage.
    pub fn parse(s: &str) -> AppResult<Rarity> {
        match s {
            "common" => Ok(Rarity::Common),
            "rare" => Ok(Rarity::Rare),
            "epic" => Ok(Rarity::Epic),
            "legendary" => Ok(Rarity::Legendary),
            "mythic" => Ok(Rarity::Mythic),
            other => Err(AppError::Validation(format!("unknown rarity: {}", other))),
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Статическая запись каталога призов. Определяется при старте процесса и
/// дальше только читается.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeDef {
    /// Display name
    pub name: String,
    /// Rarity tier
    pub rarity: Rarity,
    /// Display glyph
    pub emoji: String,
    /// Point value (non-negative)
    pub value: i64,
}

impl PrizeDef {
    fn new(name: &str, rarity: Rarity, emoji: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            rarity,
            emoji: emoji.to_string(),
            value,
        }
    }
}

/// Cumulative upper bounds per tier: Common 55%, Rare 25%, Epic 13%,
/// Legendary 6%, Mythic 1%. The last bound is exactly 1.0 so every roll
/// in [0, 1) resolves.
const CUMULATIVE_TABLE: [(Rarity, f64); 5] = [
    (Rarity::Common, 0.55),
    (Rarity::Rare, 0.80),
    (Rarity::Epic, 0.93),
    (Rarity::Legendary, 0.99),
    (Rarity::Mythic, 1.0),
];

/// Каталог призов космической тематики. Минимум один приз на каждый тир.
pub static CATALOG: Lazy<Vec<PrizeDef>> = Lazy::new(|| {
    vec![
        PrizeDef::new("Звёздная пыль", Rarity::Common, "✨", 10),
        PrizeDef::new("Лунный камень", Rarity::Common, "🌑", 15),
        PrizeDef::new("Метеорит", Rarity::Common, "☄️", 20),
        PrizeDef::new("Кольцо Сатурна", Rarity::Rare, "🪐", 50),
        PrizeDef::new("Комета Галлея", Rarity::Rare, "💫", 75),
        PrizeDef::new("Туманность Ориона", Rarity::Epic, "🌌", 250),
        PrizeDef::new("Пульсар", Rarity::Epic, "📡", 300),
        PrizeDef::new("Сверхновая", Rarity::Legendary, "💥", 1000),
        PrizeDef::new("Чёрная дыра", Rarity::Mythic, "🕳️", 5000),
    ]
});

/// Resolve a uniform roll in [0, 1) to a rarity tier against the cumulative
/// table, first tier whose upper bound exceeds the roll wins.
pub fn rarity_for_roll(roll: f64) -> Rarity {
    for (rarity, bound) in CUMULATIVE_TABLE {
        if roll < bound {
            return rarity;
        }
    }
    // roll is always < 1.0 for a uniform [0,1) sample; guard against NaN or
    // a caller passing exactly 1.0
    Rarity::Mythic
}

/// Marginal draw probability of a tier (difference of adjacent cumulative
/// bounds).
pub fn tier_probability(rarity: Rarity) -> f64 {
    let mut prev = 0.0;
    for (tier, bound) in CUMULATIVE_TABLE {
        if tier == rarity {
            return bound - prev;
        }
        prev = bound;
    }
    0.0
}

/// Draw one prize: a single uniform roll picks the tier, then a uniform
/// choice among the catalog entries of that tier.
pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> PrizeDef {
    let roll: f64 = rng.gen();
    let rarity = rarity_for_roll(roll);
    prize_for_rarity(rng, rarity)
}

/// Uniform choice among the catalog entries of the given tier.
pub fn prize_for_rarity<R: Rng + ?Sized>(rng: &mut R, rarity: Rarity) -> PrizeDef {
    let tier: Vec<&PrizeDef> = CATALOG.iter().filter(|p| p.rarity == rarity).collect();
    // the catalog is checked in tests to cover every tier
    let idx = rng.gen_range(0..tier.len());
    tier[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_catalog_covers_every_tier() {
        for rarity in Rarity::ALL {
            assert!(
                CATALOG.iter().any(|p| p.rarity == rarity),
                "no catalog entry for {}",
                rarity
            );
        }
    }

    #[test]
    fn test_catalog_values_non_negative() {
        for prize in CATALOG.iter() {
            assert!(prize.value >= 0, "{} has negative value", prize.name);
        }
    }

    #[test]
    fn test_rarity_roundtrip() {
        for rarity in Rarity::ALL {
            assert_eq!(Rarity::parse(rarity.as_str()).unwrap(), rarity);
        }
        assert!(Rarity::parse("cosmic").is_err());
    }

    #[test]
    fn test_rarity_ordering() {
        assert!(Rarity::Common < Rarity::Rare);
        assert!(Rarity::Rare < Rarity::Epic);
        assert!(Rarity::Epic < Rarity::Legendary);
        assert!(Rarity::Legendary < Rarity::Mythic);
    }

    #[test]
    fn test_cumulative_bounds() {
        // Boundary rolls land on the documented tiers.
        assert_eq!(rarity_for_roll(0.0), Rarity::Common);
        assert_eq!(rarity_for_roll(0.549_999), Rarity::Common);
        assert_eq!(rarity_for_roll(0.55), Rarity::Rare);
        assert_eq!(rarity_for_roll(0.799_999), Rarity::Rare);
        assert_eq!(rarity_for_roll(0.80), Rarity::Epic);
        assert_eq!(rarity_for_roll(0.929_999), Rarity::Epic);
        assert_eq!(rarity_for_roll(0.93), Rarity::Legendary);
        assert_eq!(rarity_for_roll(0.989_999), Rarity::Legendary);
        assert_eq!(rarity_for_roll(0.99), Rarity::Mythic);
        assert_eq!(rarity_for_roll(0.999_999), Rarity::Mythic);
    }

    #[test]
    fn test_draw_frequencies_converge() {
        // 55/25/13/6/1 within a 1.5 percentage-point tolerance at N=200k.
        let mut rng = StdRng::seed_from_u64(42);
        let n = 200_000;
        let mut counts: HashMap<Rarity, u64> = HashMap::new();
        for _ in 0..n {
            *counts.entry(draw(&mut rng).rarity).or_default() += 1;
        }

        let expected = [
            (Rarity::Common, 0.55),
            (Rarity::Rare, 0.25),
            (Rarity::Epic, 0.13),
            (Rarity::Legendary, 0.06),
            (Rarity::Mythic, 0.01),
        ];
        for (rarity, p) in expected {
            let observed = *counts.get(&rarity).unwrap_or(&0) as f64 / n as f64;
            assert!(
                (observed - p).abs() < 0.015,
                "{}: observed {:.4}, expected {:.2}",
                rarity,
                observed,
                p
            );
        }
    }

    #[test]
    fn test_tier_probabilities_sum_to_one() {
        let total: f64 = Rarity::ALL.iter().map(|r| tier_probability(*r)).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((tier_probability(Rarity::Common) - 0.55).abs() < 1e-9);
        assert!((tier_probability(Rarity::Mythic) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_prize_for_rarity_stays_in_tier() {
        let mut rng = StdRng::seed_from_u64(7);
        for rarity in Rarity::ALL {
            for _ in 0..20 {
                assert_eq!(prize_for_rarity(&mut rng, rarity).rarity, rarity);
            }
        }
    }
}
