use linkmap_common::MAX_RELATIONS;

use crate::error::Result;
use crate::LinkStore;

impl LinkStore {
    /// Replace the set of outgoing relations for `link_id` atomically.
    /// Pairs arrive already thresholded and truncated.
    ///
    /// Only one edge per unordered pair is kept: when the reversed edge
    /// already exists its score is refreshed instead of inserting a
    /// mirror row.
    pub async fn save_relations(&self, link_id: i64, pairs: &[(i64, f64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM link_relations WHERE link_id = $1")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        for (other_id, score) in pairs {
            let reversed = sqlx::query(
                "UPDATE link_relations SET score = $3 WHERE link_id = $1 AND related_id = $2",
            )
            .bind(other_id)
            .bind(link_id)
            .bind(score)
            .execute(&mut *tx)
            .await?;

            if reversed.rows_affected() == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO link_relations (link_id, related_id, score)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (link_id, related_id) DO UPDATE SET score = EXCLUDED.score
                    "#,
                )
                .bind(link_id)
                .bind(other_id)
                .bind(score)
                .execute(&mut *tx)
                .await?;
            }
        }

        let ids: Vec<i64> = pairs.iter().map(|(id, _)| *id).collect();
        sqlx::query("UPDATE links SET related_ids = $2, updated_at = now() WHERE id = $1")
            .bind(link_id)
            .bind(serde_json::json!(ids))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Union of outgoing and incoming relations, deduplicated by the
    /// other endpoint keeping the higher score, best first. Equal scores
    /// break ties toward the lower link id.
    pub async fn get_relations(&self, link_id: i64) -> Result<Vec<(i64, f64)>> {
        let rows = sqlx::query_as::<_, (i64, f64)>(
            r#"
            SELECT other_id, MAX(score) AS score FROM (
                SELECT related_id AS other_id, score FROM link_relations WHERE link_id = $1
                UNION ALL
                SELECT link_id AS other_id, score FROM link_relations WHERE related_id = $1
            ) edges
            GROUP BY other_id
            ORDER BY score DESC, other_id ASC
            LIMIT $2
            "#,
        )
        .bind(link_id)
        .bind(MAX_RELATIONS as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete every relation row touching `link_id` and scrub it from
    /// other links' cached relation-id lists. Returns how many remote
    /// rows had references scrubbed.
    pub async fn remove_link_from_relations(&self, link_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM link_relations WHERE link_id = $1 OR related_id = $1")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        let scrubbed = sqlx::query(
            r#"
            UPDATE links
            SET related_ids = (
                SELECT COALESCE(jsonb_agg(e), '[]'::jsonb)
                FROM jsonb_array_elements(related_ids) e
                WHERE e::text::bigint <> $1
            ),
            updated_at = now()
            WHERE id <> $1 AND related_ids @> jsonb_build_array($1::bigint)
            "#,
        )
        .bind(link_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(scrubbed.rows_affected())
    }
}
