use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Result};

use crate::prizes::{PrizeDef, Rarity};

/// Структура, представляющая аккаунт игрока в базе данных.
#[derive(Debug, Clone)]
pub struct Account {
    /// Telegram ID пользователя
    pub telegram_id: i64,
    /// Имя пользователя (username) в Telegram, если доступно
    pub username: Option<String>,
    /// Баланс кристаллов (основная валюта, не может быть отрицательным)
    pub crystals: i64,
    /// Баланс звёздной пыли (вторичная валюта, ядром не используется)
    pub stardust: i64,
}

impl Account {
    /// Возвращает Telegram ID аккаунта.
    pub fn telegram_id(&self) -> i64 {
        self.telegram_id
    }
}

/// Структура, представляющая выигранный приз в инвентаре.
#[derive(Debug, Clone)]
pub struct InventoryEntry {
    /// ID записи
    pub id: i64,
    /// Название приза
    pub name: String,
    /// Редкость приза
    pub rarity: Rarity,
    /// Эмодзи приза
    pub emoji: String,
    /// Ценность приза в очках
    pub value: i64,
    /// Идентификатор доставленного внешнего подарка, если был
    pub gift_id: Option<String>,
    /// Дата и время выигрыша
    pub won_at: String,
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs schema
/// migrations on the first connection.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    // Ensure schema is up to date on first connection
    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::error!("Failed to migrate schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is automatically returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Migrate database schema to ensure all required tables and columns exist
///
/// Creates missing tables and safely adds missing columns to existing ones.
pub fn migrate_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
             telegram_id INTEGER PRIMARY KEY,
             username    TEXT,
             crystals    INTEGER NOT NULL DEFAULT 0,
             stardust    INTEGER NOT NULL DEFAULT 0,
             created_at  TEXT NOT NULL DEFAULT (datetime('now'))
         );
         CREATE TABLE IF NOT EXISTS inventory (
             id          INTEGER PRIMARY KEY AUTOINCREMENT,
             telegram_id INTEGER NOT NULL,
             name        TEXT NOT NULL,
             rarity      TEXT NOT NULL,
             emoji       TEXT NOT NULL,
             value       INTEGER NOT NULL,
             gift_id     TEXT,
             won_at      TEXT NOT NULL DEFAULT (datetime('now'))
         );
         CREATE INDEX IF NOT EXISTS idx_inventory_telegram_id ON inventory (telegram_id);
         CREATE TABLE IF NOT EXISTS payment_credits (
             charge_id   TEXT PRIMARY KEY,
             telegram_id INTEGER NOT NULL,
             amount      INTEGER NOT NULL,
             credited_at TEXT NOT NULL DEFAULT (datetime('now'))
         );",
    )?;

    // Older installations predate the secondary currency column
    let mut stmt = conn.prepare("PRAGMA table_info(accounts)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    if !columns.contains(&"stardust".to_string()) {
        log::info!("Adding missing column: stardust to accounts table");
        if let Err(e) = conn.execute("ALTER TABLE accounts ADD COLUMN stardust INTEGER NOT NULL DEFAULT 0", []) {
            log::warn!("Failed to add stardust column: {}", e);
        }
    }

    Ok(())
}

/// Создает новый аккаунт в базе данных с нулевыми балансами.
///
/// # Errors
///
/// Возвращает ошибку если аккаунт с таким ID уже существует или произошла
/// ошибка БД.
pub fn create_account(conn: &Connection, telegram_id: i64, username: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (telegram_id, username) VALUES (?1, ?2)",
        &[&telegram_id as &dyn rusqlite::ToSql, &username as &dyn rusqlite::ToSql],
    )?;
    Ok(())
}

/// Получает аккаунт из базы данных по Telegram ID.
///
/// Возвращает `Ok(Some(Account))` если аккаунт найден, `Ok(None)` если нет.
pub fn get_account(conn: &Connection, telegram_id: i64) -> Result<Option<Account>> {
    let mut stmt = conn.prepare("SELECT telegram_id, username, crystals, stardust FROM accounts WHERE telegram_id = ?")?;
    let mut rows = stmt.query(&[&telegram_id as &dyn rusqlite::ToSql])?;

    if let Some(row) = rows.next()? {
        Ok(Some(Account {
            telegram_id: row.get(0)?,
            username: row.get(1)?,
            crystals: row.get(2)?,
            stardust: row.get(3)?,
        }))
    } else {
        Ok(None)
    }
}

/// Получает аккаунт, создавая его при первом обращении.
pub fn ensure_account(conn: &Connection, telegram_id: i64, username: Option<&str>) -> Result<Account> {
    if let Some(account) = get_account(conn, telegram_id)? {
        return Ok(account);
    }
    create_account(conn, telegram_id, username)?;
    log::info!("Created account for user {}", telegram_id);
    Ok(Account {
        telegram_id,
        username: username.map(|s| s.to_string()),
        crystals: 0,
        stardust: 0,
    })
}

/// Списывает `amount` кристаллов с баланса.
///
/// UPDATE защищён условием `crystals >= amount`, поэтому баланс не может
/// уйти в минус даже при гонке. Возвращает `true` если списание прошло,
/// `false` если средств не хватило.
pub fn debit_crystals(conn: &Connection, telegram_id: i64, amount: i64) -> Result<bool> {
    let rows_affected = conn.execute(
        "UPDATE accounts SET crystals = crystals - ?1 WHERE telegram_id = ?2 AND crystals >= ?1",
        &[&amount as &dyn rusqlite::ToSql, &telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(rows_affected > 0)
}

/// Начисляет `amount` кристаллов на баланс.
pub fn credit_crystals(conn: &Connection, telegram_id: i64, amount: i64) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET crystals = crystals + ?1 WHERE telegram_id = ?2",
        &[&amount as &dyn rusqlite::ToSql, &telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(())
}

/// Сохраняет выигранный приз в инвентарь (по значению, со снимком полей
/// каталога на момент выигрыша).
pub fn insert_inventory_entry(
    conn: &Connection,
    telegram_id: i64,
    prize: &PrizeDef,
    gift_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO inventory (telegram_id, name, rarity, emoji, value, gift_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &[
            &telegram_id as &dyn rusqlite::ToSql,
            &prize.name as &dyn rusqlite::ToSql,
            &prize.rarity.as_str() as &dyn rusqlite::ToSql,
            &prize.emoji as &dyn rusqlite::ToSql,
            &prize.value as &dyn rusqlite::ToSql,
            &gift_id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

/// Получает последние N записей инвентаря пользователя.
pub fn get_inventory(conn: &Connection, telegram_id: i64, limit: i64) -> Result<Vec<InventoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, rarity, emoji, value, gift_id, won_at FROM inventory
         WHERE telegram_id = ? ORDER BY id DESC LIMIT ?",
    )?;
    let rows = stmt.query_map(
        &[&telegram_id as &dyn rusqlite::ToSql, &limit as &dyn rusqlite::ToSql],
        |row| {
            let rarity_str: String = row.get(2)?;
            Ok(InventoryEntry {
                id: row.get(0)?,
                name: row.get(1)?,
                rarity: Rarity::parse(&rarity_str).unwrap_or(Rarity::Common),
                emoji: row.get(3)?,
                value: row.get(4)?,
                gift_id: row.get(5)?,
                won_at: row.get(6)?,
            })
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Количество записей в инвентаре пользователя.
pub fn count_inventory(conn: &Connection, telegram_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM inventory WHERE telegram_id = ?",
        [telegram_id],
        |row| row.get(0),
    )
}

/// Регистрирует платёж по его charge_id.
///
/// Таблица payment_credits — журнал идемпотентности: повторное подтверждение
/// того же платежа (дубликат charge_id) не начисляется второй раз.
/// Возвращает `true` если платёж новый, `false` если уже был учтён.
pub fn insert_payment_credit(conn: &Connection, charge_id: &str, telegram_id: i64, amount: i64) -> Result<bool> {
    let rows_affected = conn.execute(
        "INSERT OR IGNORE INTO payment_credits (charge_id, telegram_id, amount) VALUES (?1, ?2, ?3)",
        &[
            &charge_id as &dyn rusqlite::ToSql,
            &telegram_id as &dyn rusqlite::ToSql,
            &amount as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(rows_affected > 0)
}

/// Сумма всех учтённых платежей (для админской сводки).
pub fn total_credited(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(SUM(amount), 0) FROM payment_credits", [], |row| {
        row.get(0)
    })
    .optional()
    .map(|v| v.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prizes::CATALOG;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_ensure_account_creates_once() {
        let conn = test_conn();
        let a = ensure_account(&conn, 42, Some("alice")).unwrap();
        assert_eq!(a.crystals, 0);
        assert_eq!(a.stardust, 0);

        credit_crystals(&conn, 42, 10).unwrap();
        let b = ensure_account(&conn, 42, None).unwrap();
        assert_eq!(b.crystals, 10);
        assert_eq!(b.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_debit_guard_rejects_overdraft() {
        let conn = test_conn();
        ensure_account(&conn, 1, None).unwrap();
        credit_crystals(&conn, 1, 50).unwrap();

        assert!(!debit_crystals(&conn, 1, 51).unwrap());
        assert_eq!(get_account(&conn, 1).unwrap().unwrap().crystals, 50);

        assert!(debit_crystals(&conn, 1, 50).unwrap());
        assert_eq!(get_account(&conn, 1).unwrap().unwrap().crystals, 0);
    }

    #[test]
    fn test_inventory_roundtrip() {
        let conn = test_conn();
        ensure_account(&conn, 7, None).unwrap();
        let prize = &CATALOG[0];
        insert_inventory_entry(&conn, 7, prize, Some("gift-1")).unwrap();
        insert_inventory_entry(&conn, 7, prize, None).unwrap();

        let entries = get_inventory(&conn, 7, 10).unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first
        assert_eq!(entries[0].gift_id, None);
        assert_eq!(entries[1].gift_id.as_deref(), Some("gift-1"));
        assert_eq!(entries[0].name, prize.name);
        assert_eq!(entries[0].rarity, prize.rarity);
        assert_eq!(count_inventory(&conn, 7).unwrap(), 2);
    }

    #[test]
    fn test_payment_credit_dedup() {
        let conn = test_conn();
        ensure_account(&conn, 9, None).unwrap();
        assert!(insert_payment_credit(&conn, "charge-abc", 9, 100).unwrap());
        assert!(!insert_payment_credit(&conn, "charge-abc", 9, 100).unwrap());
        assert_eq!(total_credited(&conn).unwrap(), 100);
    }

    #[test]
    fn test_migrate_schema_is_idempotent() {
        let conn = test_conn();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        ensure_account(&conn, 3, None).unwrap();
    }
}
