//! Questions the gateway could not answer well, queued for review.

use super::{now_string, parse_timestamp, Database, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnansweredQuestion {
    pub id: i64,
    pub tenant_id: i64,
    pub agent_id: i64,
    pub knowledge_base_id: Option<i64>,
    pub question: String,
    pub answer: String,
    pub confidence: Option<f64>,
    pub status: String,
    pub occurrences: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUnansweredQuestion {
    pub tenant_id: i64,
    pub agent_id: i64,
    pub knowledge_base_id: Option<i64>,
    pub question: String,
    pub answer: String,
    pub confidence: Option<f64>,
}

/// What [`Database::record_unanswered`] did with a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnansweredWrite {
    Inserted { id: i64 },
    Bumped { id: i64, occurrences: i64 },
}

const PENDING_COLUMNS: &str = "SELECT id, tenant_id, agent_id, knowledge_base_id, question, answer,
                        confidence, status, occurrences, created_at
                 FROM unanswered_questions
                 WHERE agent_id = ?1 AND knowledge_base_id IS ?2 AND status = 'pending'
                 ORDER BY id";

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<UnansweredQuestion> {
    Ok(UnansweredQuestion {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        agent_id: row.get(2)?,
        knowledge_base_id: row.get(3)?,
        question: row.get(4)?,
        answer: row.get(5)?,
        confidence: row.get(6)?,
        status: row.get(7)?,
        occurrences: row.get(8)?,
        created_at: parse_timestamp(row.get(9)?),
    })
}

impl Database {
    /// Pending questions for one agent and knowledge base (a `None` knowledge
    /// base only matches rows without one).
    pub async fn pending_questions(
        &self,
        agent_id: i64,
        knowledge_base_id: Option<i64>,
    ) -> Result<Vec<UnansweredQuestion>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(PENDING_COLUMNS)?;
            let rows = stmt
                .query_map(params![agent_id, knowledge_base_id], question_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Bump the first pending question of the same agent and knowledge base
    /// that `is_duplicate` accepts, or insert `question` when none does.
    ///
    /// The scan and the write share one transaction, so concurrent callers
    /// with the same question end up on a single pending row.
    pub async fn record_unanswered<F>(
        &self,
        question: NewUnansweredQuestion,
        is_duplicate: F,
    ) -> Result<UnansweredWrite, StoreError>
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let now = now_string();

            let duplicate = {
                let mut stmt = tx.prepare(PENDING_COLUMNS)?;
                let pending = stmt
                    .query_map(
                        params![question.agent_id, question.knowledge_base_id],
                        question_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                pending.into_iter().find(|row| is_duplicate(&row.question))
            };

            let write = match duplicate {
                Some(existing) => {
                    let occurrences: i64 = tx.query_row(
                        "UPDATE unanswered_questions
                         SET occurrences = occurrences + 1, last_seen_at = ?2
                         WHERE id = ?1
                         RETURNING occurrences",
                        params![existing.id, now],
                        |row| row.get(0),
                    )?;
                    UnansweredWrite::Bumped {
                        id: existing.id,
                        occurrences,
                    }
                }
                None => {
                    tx.execute(
                        "INSERT INTO unanswered_questions
                             (tenant_id, agent_id, knowledge_base_id, question, answer, confidence,
                              created_at, last_seen_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                        params![
                            question.tenant_id,
                            question.agent_id,
                            question.knowledge_base_id,
                            question.question,
                            question.answer,
                            question.confidence,
                            now
                        ],
                    )?;
                    UnansweredWrite::Inserted {
                        id: tx.last_insert_rowid(),
                    }
                }
            };
            tx.commit()?;
            Ok(write)
        })
        .await
    }

    /// Mark a question as handled so it stops absorbing duplicates.
    pub async fn resolve_unanswered(&self, id: i64) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE unanswered_questions SET status = 'resolved' WHERE id = ?1",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, kb: Option<i64>) -> NewUnansweredQuestion {
        NewUnansweredQuestion {
            tenant_id: 1,
            agent_id: 9,
            knowledge_base_id: kb,
            question: text.to_string(),
            answer: "I'm not sure".to_string(),
            confidence: Some(0.2),
        }
    }

    async fn insert(db: &Database, question: NewUnansweredQuestion) -> i64 {
        match db.record_unanswered(question, |_| false).await.unwrap() {
            UnansweredWrite::Inserted { id } => id,
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pending_scoped_by_knowledge_base() {
        let db = Database::in_memory().await.unwrap();
        insert(&db, question("refund policy?", Some(4))).await;
        insert(&db, question("opening hours?", None)).await;

        let with_kb = db.pending_questions(9, Some(4)).await.unwrap();
        assert_eq!(with_kb.len(), 1);
        assert_eq!(with_kb[0].question, "refund policy?");

        let without_kb = db.pending_questions(9, None).await.unwrap();
        assert_eq!(without_kb.len(), 1);
        assert_eq!(without_kb[0].question, "opening hours?");
    }

    #[tokio::test]
    async fn test_resolved_question_stops_absorbing_duplicates() {
        let db = Database::in_memory().await.unwrap();
        let id = insert(&db, question("refund policy?", Some(4))).await;

        assert!(db.resolve_unanswered(id).await.unwrap());
        assert!(db.pending_questions(9, Some(4)).await.unwrap().is_empty());

        let next = db
            .record_unanswered(question("refund policy?", Some(4)), |_| true)
            .await
            .unwrap();
        assert!(matches!(next, UnansweredWrite::Inserted { id: new_id } if new_id != id));
    }

    #[tokio::test]
    async fn test_record_unanswered_bumps_matching_row() {
        let db = Database::in_memory().await.unwrap();
        let id = insert(&db, question("refund policy?", Some(4))).await;

        let second = db
            .record_unanswered(question("refund policy", Some(4)), |q| q.starts_with("refund"))
            .await
            .unwrap();
        assert_eq!(second, UnansweredWrite::Bumped { id, occurrences: 2 });

        // Other knowledge bases are never scanned.
        let other = db
            .record_unanswered(question("refund policy", Some(5)), |_| true)
            .await
            .unwrap();
        assert!(matches!(other, UnansweredWrite::Inserted { .. }));
    }
}
