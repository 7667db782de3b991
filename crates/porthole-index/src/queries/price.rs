use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::records::{required_decimal, ModelPriceRecord};
use crate::Result;

const COLUMNS: &str = "model_id, effective_date, input, output, cache_read, cache_write_5m, cache_write_1h";

fn from_row(row: &Row) -> rusqlite::Result<(String, String, String, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn finish(
    raw: (String, String, String, String, String, String, String),
) -> Result<ModelPriceRecord> {
    Ok(ModelPriceRecord {
        model_id: raw.0,
        effective_date: raw.1,
        input: required_decimal(raw.2)?,
        output: required_decimal(raw.3)?,
        cache_read: required_decimal(raw.4)?,
        cache_write_5m: required_decimal(raw.5)?,
        cache_write_1h: required_decimal(raw.6)?,
    })
}

pub fn insert(conn: &Connection, price: &ModelPriceRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO model_prices
            (model_id, effective_date, input, output, cache_read, cache_write_5m, cache_write_1h)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(model_id, effective_date) DO UPDATE SET
            input = ?3, output = ?4, cache_read = ?5, cache_write_5m = ?6, cache_write_1h = ?7
        "#,
        params![
            &price.model_id,
            &price.effective_date,
            price.input.to_string(),
            price.output.to_string(),
            price.cache_read.to_string(),
            price.cache_write_5m.to_string(),
            price.cache_write_1h.to_string(),
        ],
    )?;

    Ok(())
}

/// The price in effect on `date`: most recent effective_date <= date.
pub fn lookup(conn: &Connection, model_id: &str, date: &str) -> Result<Option<ModelPriceRecord>> {
    let query = format!(
        "SELECT {} FROM model_prices \
         WHERE model_id = ?1 AND effective_date <= ?2 \
         ORDER BY effective_date DESC LIMIT 1",
        COLUMNS
    );

    let raw = conn
        .query_row(&query, params![model_id, date], from_row)
        .optional()?;

    raw.map(finish).transpose()
}

/// Most recently effective price row for a model, regardless of date.
pub fn latest(conn: &Connection, model_id: &str) -> Result<Option<ModelPriceRecord>> {
    let query = format!(
        "SELECT {} FROM model_prices \
         WHERE model_id = ?1 ORDER BY effective_date DESC LIMIT 1",
        COLUMNS
    );

    let raw = conn.query_row(&query, [model_id], from_row).optional()?;

    raw.map(finish).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use rust_decimal::Decimal;

    fn price(model: &str, date: &str, input: &str) -> ModelPriceRecord {
        ModelPriceRecord {
            model_id: model.into(),
            effective_date: date.into(),
            input: input.parse().unwrap(),
            output: "25".parse().unwrap(),
            cache_read: "0.5".parse().unwrap(),
            cache_write_5m: "6.25".parse().unwrap(),
            cache_write_1h: "10".parse().unwrap(),
        }
    }

    #[test]
    fn lookup_selects_greatest_effective_date_at_or_before_target() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &price("claude-opus-4-5", "2025-11-01", "5")).unwrap();
        insert(db.conn(), &price("claude-opus-4-5", "2026-01-15", "4")).unwrap();
        insert(db.conn(), &price("claude-opus-4-5", "2026-03-01", "3")).unwrap();

        let hit = lookup(db.conn(), "claude-opus-4-5", "2026-01-22")
            .unwrap()
            .unwrap();
        assert_eq!(hit.effective_date, "2026-01-15");
        assert_eq!(hit.input, Decimal::from(4));

        // Exactly on an effective date picks that row.
        let exact = lookup(db.conn(), "claude-opus-4-5", "2026-03-01")
            .unwrap()
            .unwrap();
        assert_eq!(exact.effective_date, "2026-03-01");

        // Before every effective date: no price.
        assert!(lookup(db.conn(), "claude-opus-4-5", "2025-01-01")
            .unwrap()
            .is_none());

        // Unknown model: no price.
        assert!(lookup(db.conn(), "claude-haiku-1", "2026-01-22")
            .unwrap()
            .is_none());
    }

    #[test]
    fn latest_ignores_target_date() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &price("claude-opus-4-5", "2025-11-01", "5")).unwrap();
        insert(db.conn(), &price("claude-opus-4-5", "2026-03-01", "3")).unwrap();

        let latest_row = latest(db.conn(), "claude-opus-4-5").unwrap().unwrap();
        assert_eq!(latest_row.effective_date, "2026-03-01");
    }
}
