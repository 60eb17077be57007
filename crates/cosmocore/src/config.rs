use once_cell::sync::Lazy;
use std::env;

/// Configuration constants for the bot

/// Path to the SQLite database file
/// Read from DATABASE_PATH environment variable
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "cosmohunt.sqlite".to_string()));

/// Bot token for Telegram API
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_default()
});

/// URL of the Cosmic Treasure Hunt mini-app front-end
/// Read from WEBAPP_URL environment variable; the /start keyboard hides the
/// launch button when unset
pub static WEBAPP_URL: Lazy<Option<String>> = Lazy::new(|| env::var("WEBAPP_URL").ok());

/// Log file path
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "cosmobot.log".to_string()));

/// Case opening configuration
pub mod cases {
    use super::*;

    /// Сколько кристаллов стоит открытие одного кейса
    /// Read from CASE_COST_CRYSTALS environment variable
    pub static COST_CRYSTALS: Lazy<i64> = Lazy::new(|| {
        env::var("CASE_COST_CRYSTALS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100)
    });

    /// How many inventory entries /inventory and the mini-app list by default
    pub const INVENTORY_PAGE_SIZE: i64 = 20;
}

/// Stars topup configuration
pub mod prices {
    /// Available topup packs: (Stars price, crystals credited).
    /// 1 Star buys 1 crystal; larger packs carry a bonus.
    pub const TOPUP_PACKS: [(u32, i64); 4] = [(50, 50), (100, 110), (250, 300), (500, 650)];

    /// Crystals in the pack priced at `stars` Stars, if such a pack exists.
    /// Invoice creation validates against this so a forged callback cannot
    /// buy an arbitrary amount.
    pub fn pack_crystals(stars: u32) -> Option<i64> {
        TOPUP_PACKS
            .iter()
            .find(|(price, _)| *price == stars)
            .map(|(_, crystals)| *crystals)
    }

    /// Crystals credited for a settled payment of `stars` Stars.
    /// Unknown amounts (e.g. a pack removed after the invoice was issued)
    /// fall back to 1:1.
    pub fn crystals_for_stars(stars: u32) -> i64 {
        TOPUP_PACKS
            .iter()
            .find(|(price, _)| *price == stars)
            .map(|(_, crystals)| *crystals)
            .unwrap_or(i64::from(stars))
    }
}

/// Gift pool configuration
pub mod gifts {
    use super::*;

    /// Maximum number of scarce gift ids cached at startup
    pub const POOL_CAP: usize = 50;

    /// Disable gift delivery entirely (pool stays empty)
    /// Read from GIFTS_DISABLED environment variable
    pub static DISABLED: Lazy<bool> = Lazy::new(|| {
        env::var("GIFTS_DISABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crystals_for_known_pack() {
        assert_eq!(prices::crystals_for_stars(50), 50);
        assert_eq!(prices::crystals_for_stars(100), 110);
        assert_eq!(prices::crystals_for_stars(500), 650);
    }

    #[test]
    fn test_pack_lookup() {
        assert_eq!(prices::pack_crystals(100), Some(110));
        assert_eq!(prices::pack_crystals(77), None);
    }

    #[test]
    fn test_crystals_for_unknown_amount_falls_back_one_to_one() {
        assert_eq!(prices::crystals_for_stars(77), 77);
        assert_eq!(prices::crystals_for_stars(1), 1);
    }

    #[test]
    fn test_topup_packs_are_sorted_and_bonused() {
        let mut prev = 0;
        for (stars, crystals) in prices::TOPUP_PACKS {
            assert!(stars > prev, "packs must be listed in ascending order");
            assert!(crystals >= i64::from(stars), "a pack never credits less than 1:1");
            prev = stars;
        }
    }
}
