//! Per-user scan allowance.
//!
//! A credit is taken when a scan is admitted, not when it completes, so a
//! scan that later fails has still consumed its credit.

use rusqlite::{params, OptionalExtension};

use crate::store::ScanDb;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient scan credits")]
    InsufficientCredits,

    #[error("Credit store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Store(e.into())
    }
}

pub trait CreditLedger: Send + Sync {
    /// Atomically take one credit. Never drives a balance below zero.
    fn try_reserve(&self, user_id: &str) -> Result<(), LedgerError>;

    /// Give back a credit taken by `try_reserve` when admission could not
    /// finish creating the scan.
    fn refund(&self, user_id: &str) -> Result<(), LedgerError>;

    /// Current balance; 0 for users the ledger has never seen.
    fn balance(&self, user_id: &str) -> Result<i64, LedgerError>;

    /// Open an account with `initial` credits unless one already exists.
    /// Returns true when a new account was created.
    fn ensure_account(&self, user_id: &str, initial: i64) -> Result<bool, LedgerError>;

    /// Add credits, creating the account if needed. Returns the new balance.
    fn grant(&self, user_id: &str, amount: i64) -> Result<i64, LedgerError>;
}

impl CreditLedger for ScanDb {
    fn try_reserve(&self, user_id: &str) -> Result<(), LedgerError> {
        let conn = self.conn();
        // Single conditional statement: concurrent reservations serialize on
        // the row and at most `balance` of them can succeed.
        let updated = conn.execute(
            "UPDATE user_credits SET balance = balance - 1 WHERE user_id=?1 AND balance > 0",
            params![user_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::InsufficientCredits);
        }
        Ok(())
    }

    fn refund(&self, user_id: &str) -> Result<(), LedgerError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE user_credits SET balance = balance + 1 WHERE user_id=?1",
            params![user_id],
        )?;
        Ok(())
    }

    fn balance(&self, user_id: &str) -> Result<i64, LedgerError> {
        let conn = self.conn();
        let balance = conn
            .query_row(
                "SELECT balance FROM user_credits WHERE user_id=?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    }

    fn ensure_account(&self, user_id: &str, initial: i64) -> Result<bool, LedgerError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO user_credits (user_id, balance) VALUES (?1, ?2)",
            params![user_id, initial.max(0)],
        )?;
        if inserted > 0 {
            tracing::info!("Opened credit account for {} with {} credits", user_id, initial);
        }
        Ok(inserted > 0)
    }

    fn grant(&self, user_id: &str, amount: i64) -> Result<i64, LedgerError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO user_credits (user_id, balance) VALUES (?1, MAX(?2, 0))
             ON CONFLICT(user_id) DO UPDATE SET balance = MAX(balance + ?2, 0)",
            params![user_id, amount],
        )?;
        let balance = conn.query_row(
            "SELECT balance FROM user_credits WHERE user_id=?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reserve_decrements() {
        let db = ScanDb::open_in_memory().unwrap();
        db.ensure_account("alice", 2).unwrap();
        db.try_reserve("alice").unwrap();
        assert_eq!(db.balance("alice").unwrap(), 1);
        db.try_reserve("alice").unwrap();
        assert_eq!(db.balance("alice").unwrap(), 0);
        assert!(matches!(
            db.try_reserve("alice"),
            Err(LedgerError::InsufficientCredits)
        ));
        assert_eq!(db.balance("alice").unwrap(), 0);
    }

    #[test]
    fn test_unknown_user_has_no_credits() {
        let db = ScanDb::open_in_memory().unwrap();
        assert_eq!(db.balance("nobody").unwrap(), 0);
        assert!(matches!(
            db.try_reserve("nobody"),
            Err(LedgerError::InsufficientCredits)
        ));
    }

    #[test]
    fn test_ensure_account_is_idempotent() {
        let db = ScanDb::open_in_memory().unwrap();
        assert!(db.ensure_account("alice", 3).unwrap());
        db.try_reserve("alice").unwrap();
        assert!(!db.ensure_account("alice", 3).unwrap());
        assert_eq!(db.balance("alice").unwrap(), 2);
    }

    #[test]
    fn test_grant_and_refund() {
        let db = ScanDb::open_in_memory().unwrap();
        assert_eq!(db.grant("alice", 5).unwrap(), 5);
        assert_eq!(db.grant("alice", 2).unwrap(), 7);
        db.try_reserve("alice").unwrap();
        db.refund("alice").unwrap();
        assert_eq!(db.balance("alice").unwrap(), 7);
        assert_eq!(db.grant("alice", -100).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_reserve_single_credit() {
        let db = Arc::new(ScanDb::open_in_memory().unwrap());
        db.ensure_account("alice", 1).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.try_reserve("alice").is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(db.balance("alice").unwrap(), 0);
    }
}
