//! Persistence abstraction over the relational tables from §6.
//!
//! A full SQL ORM is explicitly out of scope (§1); the coordinator still
//! needs *a* concrete store, so `SqliteStore` implements the minimal surface
//! with `rusqlite`.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Mutex;

use crate::error::Error;
use crate::types::{ApprovedPick, Bankroll, Bet, BettingLine, Game, GameInsight, Pick, Prediction};

/// One row per table in §6's persistence layout, addressed by `game_id`
/// (or by `date` for `Bankroll`). Each stage writes its own artifact
/// immediately after producing it (§4.9).
pub trait Store: Send + Sync {
    fn save_games(&self, games: &[Game]) -> Result<(), Error>;
    fn save_lines(&self, lines: &[BettingLine]) -> Result<(), Error>;
    fn save_insights(&self, insights: &[GameInsight]) -> Result<(), Error>;
    fn save_predictions(&self, predictions: &[Prediction]) -> Result<(), Error>;
    fn save_picks(&self, picks: &[Pick]) -> Result<(), Error>;
    fn save_approved_picks(&self, picks: &[ApprovedPick]) -> Result<(), Error>;
    fn save_bets(&self, bets: &[Bet]) -> Result<(), Error>;
    fn save_bankroll(&self, snapshot: &Bankroll) -> Result<(), Error>;
    fn load_games_for_date(&self, date: NaiveDate) -> Result<Vec<Game>, Error>;
    fn load_approved_picks_for_date(&self, date: NaiveDate) -> Result<Vec<ApprovedPick>, Error>;
    fn update_bet_result(&self, bet: &Bet) -> Result<(), Error>;

    /// Appends one row to `agent_logs`. Default is a no-op so lightweight
    /// `Store` implementations (mocks, tests) don't need to carry a log sink.
    fn log_agent_event(&self, _agent: &str, _ts: &str, _payload: &serde_json::Value) -> Result<(), Error> {
        Ok(())
    }
}

/// SQLite-backed `Store`. A single connection guarded by a mutex: the
/// coordinator touches the DB from one process per run (§5 "Shared-resource
/// policy"), so there is no need for a pool.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(|e| Error::Other(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS games (id TEXT PRIMARY KEY, date TEXT NOT NULL, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS betting_lines (game_id TEXT NOT NULL, book TEXT NOT NULL, bet_type TEXT NOT NULL, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS game_insights (game_id TEXT PRIMARY KEY, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS predictions (game_id TEXT PRIMARY KEY, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS picks (game_id TEXT PRIMARY KEY, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS approved_picks (game_id TEXT NOT NULL, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS bets (pick_id TEXT NOT NULL, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS bankroll (date TEXT PRIMARY KEY, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS card_reviews (date TEXT NOT NULL, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS agent_logs (agent TEXT NOT NULL, ts TEXT NOT NULL, payload TEXT NOT NULL);",
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn upsert<T: Serialize>(&self, table: &str, key_col: &str, key: &str, row: &T) -> Result<(), Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let payload = serde_json::to_string(row)?;
        conn.execute(
            &format!(
                "INSERT INTO {table} ({key_col}, payload) VALUES (?1, ?2) \
                 ON CONFLICT({key_col}) DO UPDATE SET payload = excluded.payload"
            ),
            rusqlite::params![key, payload],
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok(())
    }

}

impl Store for SqliteStore {
    fn save_games(&self, games: &[Game]) -> Result<(), Error> {
        for g in games {
            self.upsert("games", "id", &g.id, g)?;
        }
        Ok(())
    }

    fn save_lines(&self, lines: &[BettingLine]) -> Result<(), Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        for line in lines {
            let payload = serde_json::to_string(line)?;
            conn.execute(
                "INSERT INTO betting_lines (game_id, book, bet_type, payload) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![line.game_id, line.book, format!("{:?}", line.bet_type), payload],
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        }
        Ok(())
    }

    fn save_insights(&self, insights: &[GameInsight]) -> Result<(), Error> {
        for i in insights {
            self.upsert("game_insights", "game_id", &i.game_id, i)?;
        }
        Ok(())
    }

    fn save_predictions(&self, predictions: &[Prediction]) -> Result<(), Error> {
        for p in predictions {
            self.upsert("predictions", "game_id", &p.game_id, p)?;
        }
        Ok(())
    }

    fn save_picks(&self, picks: &[Pick]) -> Result<(), Error> {
        for p in picks {
            self.upsert("picks", "game_id", &p.game_id, p)?;
        }
        Ok(())
    }

    fn save_approved_picks(&self, picks: &[ApprovedPick]) -> Result<(), Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        for p in picks {
            let payload = serde_json::to_string(p)?;
            conn.execute(
                "INSERT INTO approved_picks (game_id, payload) VALUES (?1, ?2)",
                rusqlite::params![p.pick.game_id, payload],
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        }
        Ok(())
    }

    fn save_bets(&self, bets: &[Bet]) -> Result<(), Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        for b in bets {
            let payload = serde_json::to_string(b)?;
            conn.execute(
                "INSERT INTO bets (pick_id, payload) VALUES (?1, ?2)",
                rusqlite::params![b.pick_id, payload],
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        }
        Ok(())
    }

    fn save_bankroll(&self, snapshot: &Bankroll) -> Result<(), Error> {
        self.upsert("bankroll", "date", &snapshot.date.to_string(), snapshot)
    }

    fn load_games_for_date(&self, date: NaiveDate) -> Result<Vec<Game>, Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT payload FROM games WHERE date = ?1")
            .map_err(|e| Error::Other(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![date.to_string()], |row| {
                let payload: String = row.get(0)?;
                Ok(payload)
            })
            .map_err(|e| Error::Other(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| Error::Other(e.to_string()))?;
            out.push(deserialize(&payload)?);
        }
        Ok(out)
    }

    fn load_approved_picks_for_date(&self, date: NaiveDate) -> Result<Vec<ApprovedPick>, Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT ap.payload FROM approved_picks ap \
                 JOIN games g ON g.id = ap.game_id WHERE g.date = ?1",
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![date.to_string()], |row| {
                let payload: String = row.get(0)?;
                Ok(payload)
            })
            .map_err(|e| Error::Other(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| Error::Other(e.to_string()))?;
            out.push(deserialize(&payload)?);
        }
        Ok(out)
    }

    fn update_bet_result(&self, bet: &Bet) -> Result<(), Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let payload = serde_json::to_string(bet)?;
        conn.execute(
            "UPDATE bets SET payload = ?1 WHERE pick_id = ?2",
            rusqlite::params![payload, bet.pick_id],
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok(())
    }

    fn log_agent_event(&self, agent: &str, ts: &str, payload: &serde_json::Value) -> Result<(), Error> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO agent_logs (agent, ts, payload) VALUES (?1, ?2, ?3)",
            rusqlite::params![agent, ts, payload.to_string()],
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok(())
    }
}

/// Deterministic in-memory `Store` for coordinator tests — no real
/// persistence, just enough bookkeeping to exercise load-after-save.
#[derive(Default)]
pub struct InMemoryStore {
    games: Mutex<Vec<Game>>,
    approved_picks: Mutex<Vec<ApprovedPick>>,
    bets: Mutex<Vec<Bet>>,
}

impl Store for InMemoryStore {
    fn save_games(&self, games: &[Game]) -> Result<(), Error> {
        self.games.lock().expect("lock poisoned").extend_from_slice(games);
        Ok(())
    }
    fn save_lines(&self, _lines: &[BettingLine]) -> Result<(), Error> {
        Ok(())
    }
    fn save_insights(&self, _insights: &[GameInsight]) -> Result<(), Error> {
        Ok(())
    }
    fn save_predictions(&self, _predictions: &[Prediction]) -> Result<(), Error> {
        Ok(())
    }
    fn save_picks(&self, _picks: &[Pick]) -> Result<(), Error> {
        Ok(())
    }
    fn save_approved_picks(&self, picks: &[ApprovedPick]) -> Result<(), Error> {
        self.approved_picks.lock().expect("lock poisoned").extend_from_slice(picks);
        Ok(())
    }
    fn save_bets(&self, bets: &[Bet]) -> Result<(), Error> {
        self.bets.lock().expect("lock poisoned").extend_from_slice(bets);
        Ok(())
    }
    fn save_bankroll(&self, _snapshot: &Bankroll) -> Result<(), Error> {
        Ok(())
    }
    fn load_games_for_date(&self, date: NaiveDate) -> Result<Vec<Game>, Error> {
        Ok(self.games.lock().expect("lock poisoned").iter().filter(|g| g.date == date).cloned().collect())
    }
    fn load_approved_picks_for_date(&self, date: NaiveDate) -> Result<Vec<ApprovedPick>, Error> {
        let games = self.games.lock().expect("lock poisoned");
        let ids: std::collections::HashSet<&str> = games.iter().filter(|g| g.date == date).map(|g| g.id.as_str()).collect();
        Ok(self
            .approved_picks
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|p| ids.contains(p.pick.game_id.as_str()))
            .cloned()
            .collect())
    }
    fn update_bet_result(&self, bet: &Bet) -> Result<(), Error> {
        let mut bets = self.bets.lock().expect("lock poisoned");
        if let Some(existing) = bets.iter_mut().find(|b| b.pick_id == bet.pick_id) {
            *existing = bet.clone();
        }
        Ok(())
    }
}

fn deserialize<T: DeserializeOwned>(payload: &str) -> Result<T, Error> {
    serde_json::from_str(payload).map_err(Error::Json)
}
