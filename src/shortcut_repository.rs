//! C1 — durable click-log + aggregate stats, prefix-matched shortcut lookup,
//! and CTR-based source ranking (spec §4.1).
//!
//! Backed by a single `Arc<Mutex<Connection>>` over SQLite in WAL mode, with
//! a `PRAGMA user_version` schema gate that drops and recreates the four
//! tables on a version mismatch rather than attempting a migration.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use crate::config::{defaults, EngineConfig};
use crate::error::{Result, SuggestError};
use crate::intent_key::{intent_key, next_string};
use crate::model::{Icon, SessionStats, Shortcut, SourceTotals, Suggestion};

const SCHEMA_VERSION: i32 = 1;

/// Durable shortcut/click/source-stat store, backed by SQLite.
#[derive(Clone)]
pub struct ShortcutRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ShortcutRepository {
    /// Open (creating if absent) the repository at `path`.
    ///
    /// On a schema version mismatch the four tables are dropped and
    /// recreated — history is advisory, not authoritative (spec §4.1's
    /// failure semantics).
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let existing_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if existing_version != 0 && existing_version != SCHEMA_VERSION {
            warn!(
                existing_version,
                expected_version = SCHEMA_VERSION,
                "shortcut repository schema mismatch; dropping and recreating"
            );
            conn.execute_batch(
                "DROP TABLE IF EXISTS clicklog;
                 DROP TABLE IF EXISTS shortcuts;
                 DROP TABLE IF EXISTS sourcelog;
                 DROP TABLE IF EXISTS sourcetotals;",
            )?;
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS shortcuts (
                intent_key TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                format TEXT,
                title TEXT NOT NULL,
                description TEXT,
                icon1 TEXT,
                icon2 TEXT,
                intent_action TEXT NOT NULL,
                intent_data TEXT NOT NULL,
                intent_query TEXT NOT NULL,
                intent_extra_data TEXT,
                intent_component_name TEXT,
                shortcut_id TEXT,
                spinner_while_refreshing INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS clicklog (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                intent_key TEXT NOT NULL REFERENCES shortcuts(intent_key) ON DELETE CASCADE,
                query TEXT NOT NULL,
                hit_time INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clicklog_query ON clicklog(query);
            CREATE INDEX IF NOT EXISTS idx_clicklog_hit_time ON clicklog(hit_time);

            CREATE TABLE IF NOT EXISTS sourcelog (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                component TEXT NOT NULL,
                time INTEGER NOT NULL,
                clicks INTEGER NOT NULL,
                impressions INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sourcelog_time ON sourcelog(time);

            CREATE TABLE IF NOT EXISTS sourcetotals (
                component TEXT PRIMARY KEY,
                total_clicks INTEGER NOT NULL,
                total_impressions INTEGER NOT NULL
            );
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!(path = %path.display(), "shortcut repository opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True iff any shortcut row exists.
    pub fn has_history(&self) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM shortcuts", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Empties all four tables.
    pub fn clear_history(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "DELETE FROM clicklog; DELETE FROM shortcuts; DELETE FROM sourcelog; DELETE FROM sourcetotals;",
        )?;
        Ok(())
    }

    /// Report the outcome of one closed session (spec §4.1's `reportStats`).
    pub fn report_stats(&self, stats: &SessionStats, now_ms: i64, cfg: &EngineConfig) -> Result<()> {
        let mut conn = self.lock();

        if let Some(clicked) = &stats.clicked {
            let is_shortcutable = clicked.shortcut_id.as_deref() != Some(defaults::NEVER_MAKE_SHORTCUT);
            if is_shortcutable {
                upsert_shortcut(&conn, clicked, &stats.query)?;
                let key = intent_key(
                    &clicked.source,
                    &clicked.intent_data,
                    &clicked.intent_action,
                    &stats.query,
                );
                conn.execute(
                    "INSERT INTO clicklog (intent_key, query, hit_time) VALUES (?1, ?2, ?3)",
                    params![key, stats.query, now_ms],
                )?;
                let stat_cutoff = now_ms - cfg.max_stat_age_ms as i64;
                conn.execute("DELETE FROM clicklog WHERE hit_time < ?1", params![stat_cutoff])?;
            }
        }

        if !stats.source_impressions.is_empty() {
            let clicked_source = stats.clicked.as_ref().map(|c| c.source.as_str());
            let tx = conn.transaction()?;
            for component in &stats.source_impressions {
                let clicks = if clicked_source == Some(component.as_str()) { 1 } else { 0 };
                tx.execute(
                    "INSERT INTO sourcelog (component, time, clicks, impressions) VALUES (?1, ?2, ?3, 1)",
                    params![component, now_ms, clicks],
                )?;
            }
            tx.commit()?;
        }

        let event_cutoff = now_ms - cfg.max_source_event_age_ms as i64;
        conn.execute("DELETE FROM sourcelog WHERE time < ?1", params![event_cutoff])?;

        conn.execute_batch("DELETE FROM sourcetotals;")?;
        conn.execute(
            "INSERT INTO sourcetotals (component, total_clicks, total_impressions)
             SELECT component, SUM(clicks), SUM(impressions) FROM sourcelog GROUP BY component",
            [],
        )?;

        debug!(query = %stats.query, clicked = stats.clicked.is_some(), "reported session stats");
        Ok(())
    }

    /// Prefix-matched shortcut lookup, ordered by recency-weighted
    /// frequency (spec §4.1's `getShortcutsForQuery`).
    pub fn get_shortcuts_for_query(&self, query: &str, now_ms: i64, cfg: &EngineConfig) -> Result<Vec<Shortcut>> {
        let conn = self.lock();
        let cutoff = now_ms - cfg.max_stat_age_ms as i64;

        let mut sql = String::from(
            "SELECT s.intent_key, s.source, s.format, s.title, s.description, s.icon1, s.icon2,
                    s.intent_action, s.intent_data, s.intent_query, s.intent_extra_data,
                    s.intent_component_name, s.shortcut_id, s.spinner_while_refreshing,
                    COUNT(c.id) AS hits, MAX(c.hit_time) AS last_hit
             FROM clicklog c JOIN shortcuts s ON c.intent_key = s.intent_key
             WHERE c.hit_time >= ?1",
        );
        let upper = if query.is_empty() { None } else { next_string(query) };
        if !query.is_empty() {
            sql.push_str(" AND c.query >= ?2");
            if upper.is_some() {
                sql.push_str(" AND c.query < ?3");
            }
        }
        sql.push_str(" GROUP BY s.intent_key");

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(Suggestion, String, i64, i64)> = if query.is_empty() {
            stmt.query_map(params![cutoff], row_to_shortcut_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else if let Some(upper) = &upper {
            stmt.query_map(params![cutoff, query, upper], row_to_shortcut_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(params![cutoff, query], row_to_shortcut_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let divisor = (cfg.max_stat_age_ms as f64 / 1000.0).max(1.0);
        let mut shortcuts: Vec<Shortcut> = rows
            .into_iter()
            .map(|(suggestion, intent_query, hits, last_hit)| {
                let score = hits as f64 * ((last_hit - cutoff) as f64 / divisor);
                Shortcut {
                    suggestion,
                    intent_query,
                    score,
                }
            })
            .collect();

        shortcuts.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(shortcuts)
    }

    /// Source ranking by click-through rate with priors (spec §4.1's
    /// `getSourceRanking`).
    pub fn get_source_ranking(&self, cfg: &EngineConfig) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT component, total_clicks, total_impressions FROM sourcetotals")?;
        let mut totals: Vec<SourceTotals> = stmt
            .query_map([], |row| {
                let component_id: String = row.get(0)?;
                let total_clicks: i64 = row.get(1)?;
                let total_impressions: i64 = row.get(2)?;
                Ok((component_id, total_clicks as u64, total_impressions as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(component_id, total_clicks, total_impressions)| {
                let score = 1000.0 * (total_clicks + cfg.prior_clicks) as f64
                    / (total_impressions + cfg.prior_impressions) as f64;
                SourceTotals {
                    component_id,
                    total_clicks,
                    total_impressions,
                    ranking_score: score,
                }
            })
            .collect();

        totals.sort_by(|a, b| {
            b.ranking_score
                .partial_cmp(&a.ranking_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(totals.into_iter().map(|t| t.component_id).collect())
    }

    /// Insert/update/delete a refreshed shortcut's mutable display fields
    /// (spec §4.1's `refreshShortcut`). `intent_key` stays stable.
    pub fn refresh_shortcut(&self, source: &str, shortcut_id: &str, refreshed: Option<&Suggestion>) -> Result<()> {
        let conn = self.lock();
        match refreshed {
            None => {
                conn.execute(
                    "DELETE FROM shortcuts WHERE shortcut_id = ?1 AND source = ?2",
                    params![shortcut_id, source],
                )?;
            }
            Some(suggestion) => {
                conn.execute(
                    "UPDATE shortcuts SET format = ?1, title = ?2, description = ?3, icon1 = ?4, icon2 = ?5
                     WHERE shortcut_id = ?6 AND source = ?7",
                    params![
                        suggestion.format,
                        suggestion.title,
                        suggestion.description,
                        icon_to_json(suggestion.icon1.as_ref()),
                        icon_to_json(suggestion.icon2.as_ref()),
                        shortcut_id,
                        source,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

fn upsert_shortcut(conn: &Connection, clicked: &Suggestion, query: &str) -> Result<()> {
    let key = intent_key(&clicked.source, &clicked.intent_data, &clicked.intent_action, query);
    let icon2 = if clicked.spinner_while_refreshing {
        Some("spinner".to_string())
    } else {
        icon_to_json(clicked.icon2.as_ref())
    };

    conn.execute(
        "INSERT INTO shortcuts (intent_key, source, format, title, description, icon1, icon2,
                                 intent_action, intent_data, intent_query, intent_extra_data,
                                 intent_component_name, shortcut_id, spinner_while_refreshing)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(intent_key) DO UPDATE SET
            format = excluded.format,
            title = excluded.title,
            description = excluded.description,
            icon1 = excluded.icon1,
            icon2 = excluded.icon2,
            shortcut_id = excluded.shortcut_id,
            spinner_while_refreshing = excluded.spinner_while_refreshing",
        params![
            key,
            clicked.source,
            clicked.format,
            clicked.title,
            clicked.description,
            icon_to_json(clicked.icon1.as_ref()),
            icon2,
            clicked.intent_action,
            clicked.intent_data,
            query,
            clicked.intent_extra_data,
            clicked.intent_component_name,
            clicked.shortcut_id,
            clicked.spinner_while_refreshing as i32,
        ],
    )
    .map_err(SuggestError::from)?;
    Ok(())
}

fn icon_to_json(icon: Option<&Icon>) -> Option<String> {
    icon.map(|i| serde_json::to_string(i).unwrap_or_default())
}

fn icon_from_json(raw: Option<String>) -> Option<Icon> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_shortcut_row(row: &rusqlite::Row) -> rusqlite::Result<(Suggestion, String, i64, i64)> {
    let source: String = row.get(1)?;
    let format: Option<String> = row.get(2)?;
    let title: String = row.get(3)?;
    let description: Option<String> = row.get(4)?;
    let icon1: Option<String> = row.get(5)?;
    let icon2: Option<String> = row.get(6)?;
    let intent_action: String = row.get(7)?;
    let intent_data: String = row.get(8)?;
    let intent_query: String = row.get(9)?;
    let intent_extra_data: Option<String> = row.get(10)?;
    let intent_component_name: Option<String> = row.get(11)?;
    let shortcut_id: Option<String> = row.get(12)?;
    let spinner_while_refreshing: i64 = row.get(13)?;
    let hits: i64 = row.get(14)?;
    let last_hit: i64 = row.get(15)?;

    let suggestion = Suggestion {
        source,
        format,
        title,
        description,
        icon1: icon_from_json(icon1),
        icon2: icon_from_json(icon2),
        intent_action,
        intent_data,
        intent_data_id: None,
        intent_extra_data,
        intent_component_name,
        query: Some(intent_query.clone()),
        action_msg_call: None,
        shortcut_id,
        pin_to_bottom: false,
        spinner_while_refreshing: spinner_while_refreshing != 0,
        background_color: None,
    };
    Ok((suggestion, intent_query, hits, last_hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::NamedTempFile;

    fn sample_suggestion(source: &str, action: &str, data: &str) -> Suggestion {
        Suggestion {
            source: source.to_string(),
            format: None,
            title: format!("{source} title"),
            description: None,
            icon1: None,
            icon2: None,
            intent_action: action.to_string(),
            intent_data: data.to_string(),
            intent_data_id: None,
            intent_extra_data: None,
            intent_component_name: None,
            query: None,
            action_msg_call: None,
            shortcut_id: Some("sc1".to_string()),
            pin_to_bottom: false,
            spinner_while_refreshing: false,
            background_color: None,
        }
    }

    fn open_temp() -> (ShortcutRepository, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let repo = ShortcutRepository::open(file.path()).unwrap();
        (repo, file)
    }

    #[test]
    fn fresh_repository_has_no_history() {
        let (repo, _file) = open_temp();
        assert!(!repo.has_history().unwrap());
    }

    #[test]
    fn report_stats_then_query_round_trip() {
        let (repo, _file) = open_temp();
        let clicked = sample_suggestion("maps", "VIEW", "geo:0,0");
        let mut impressions = HashSet::new();
        impressions.insert("maps".to_string());
        let stats = SessionStats {
            query: "piz".to_string(),
            clicked: Some(clicked.clone()),
            source_impressions: impressions,
        };
        let cfg = EngineConfig::default();
        repo.report_stats(&stats, 1_000_000, &cfg).unwrap();

        assert!(repo.has_history().unwrap());

        let results = repo.get_shortcuts_for_query("pi", 1_000_001, &cfg).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].suggestion.title, "maps title");

        // A non-matching prefix returns nothing.
        let none = repo.get_shortcuts_for_query("xyz", 1_000_001, &cfg).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn refresh_shortcut_updates_mutable_fields_keeping_intent_key_stable() {
        let (repo, _file) = open_temp();
        let clicked = sample_suggestion("maps", "VIEW", "geo:0,0");
        let mut impressions = HashSet::new();
        impressions.insert("maps".to_string());
        let stats = SessionStats {
            query: "pizza".to_string(),
            clicked: Some(clicked.clone()),
            source_impressions: impressions,
        };
        let cfg = EngineConfig::default();
        repo.report_stats(&stats, 1_000_000, &cfg).unwrap();

        let mut refreshed = clicked.clone();
        refreshed.title = "Updated title".to_string();
        repo.refresh_shortcut("maps", "sc1", Some(&refreshed)).unwrap();

        let results = repo.get_shortcuts_for_query("pizza", 1_000_001, &cfg).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].suggestion.title, "Updated title");
        assert_eq!(results[0].suggestion.intent_data, "geo:0,0");
    }

    #[test]
    fn refresh_shortcut_with_none_deletes_it() {
        let (repo, _file) = open_temp();
        let clicked = sample_suggestion("maps", "VIEW", "geo:0,0");
        let mut impressions = HashSet::new();
        impressions.insert("maps".to_string());
        let stats = SessionStats {
            query: "pizza".to_string(),
            clicked: Some(clicked),
            source_impressions: impressions,
        };
        let cfg = EngineConfig::default();
        repo.report_stats(&stats, 1_000_000, &cfg).unwrap();

        repo.refresh_shortcut("maps", "sc1", None).unwrap();

        let results = repo.get_shortcuts_for_query("pizza", 1_000_001, &cfg).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn never_make_shortcut_sentinel_is_not_persisted() {
        let (repo, _file) = open_temp();
        let mut clicked = sample_suggestion("maps", "VIEW", "geo:0,0");
        clicked.shortcut_id = Some(defaults::NEVER_MAKE_SHORTCUT.to_string());
        let mut impressions = HashSet::new();
        impressions.insert("maps".to_string());
        let stats = SessionStats {
            query: "pizza".to_string(),
            clicked: Some(clicked),
            source_impressions: impressions,
        };
        let cfg = EngineConfig::default();
        repo.report_stats(&stats, 1_000_000, &cfg).unwrap();

        assert!(!repo.has_history().unwrap());
    }

    #[test]
    fn source_ranking_with_priors_matches_spec_scenario_6() {
        let (repo, _file) = open_temp();
        let cfg = EngineConfig {
            prior_clicks: 3,
            prior_impressions: 30,
            ..EngineConfig::default()
        };

        // X: 10 clicks / 100 impressions, Y: 1 click / 5 impressions.
        let mut x_impressions = HashSet::new();
        x_impressions.insert("X".to_string());
        for i in 0..10 {
            let clicked = sample_suggestion("X", "A", &format!("d{i}"));
            let stats = SessionStats {
                query: "q".to_string(),
                clicked: Some(clicked),
                source_impressions: x_impressions.clone(),
            };
            repo.report_stats(&stats, 1_000_000 + i, &cfg).unwrap();
        }
        for i in 10..100 {
            let stats = SessionStats {
                query: "q".to_string(),
                clicked: None,
                source_impressions: x_impressions.clone(),
            };
            repo.report_stats(&stats, 1_000_000 + i, &cfg).unwrap();
        }

        let mut y_impressions = HashSet::new();
        y_impressions.insert("Y".to_string());
        let clicked_y = sample_suggestion("Y", "A", "d0");
        repo.report_stats(
            &SessionStats {
                query: "q".to_string(),
                clicked: Some(clicked_y),
                source_impressions: y_impressions.clone(),
            },
            2_000_000,
            &cfg,
        )
        .unwrap();
        for i in 1..5 {
            repo.report_stats(
                &SessionStats {
                    query: "q".to_string(),
                    clicked: None,
                    source_impressions: y_impressions.clone(),
                },
                2_000_000 + i,
                &cfg,
            )
            .unwrap();
        }

        let ranking = repo.get_source_ranking(&cfg).unwrap();
        assert_eq!(ranking, vec!["Y".to_string(), "X".to_string()]);
    }

    #[test]
    fn clear_history_empties_all_tables() {
        let (repo, _file) = open_temp();
        let clicked = sample_suggestion("maps", "VIEW", "geo:0,0");
        let mut impressions = HashSet::new();
        impressions.insert("maps".to_string());
        let stats = SessionStats {
            query: "pizza".to_string(),
            clicked: Some(clicked),
            source_impressions: impressions,
        };
        repo.report_stats(&stats, 1_000_000, &EngineConfig::default()).unwrap();
        assert!(repo.has_history().unwrap());

        repo.clear_history().unwrap();
        assert!(!repo.has_history().unwrap());
        assert!(repo.get_source_ranking(&EngineConfig::default()).unwrap().is_empty());
    }
}
