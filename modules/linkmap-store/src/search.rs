use crate::error::Result;
use crate::LinkStore;

/// Convert a cosine distance into a relation score in [0, 1]:
/// `1 / (1 + distance)`, rounded to two decimals.
pub fn score_from_distance(distance: f64) -> f64 {
    ((1.0 / (1.0 + distance)) * 100.0).round() / 100.0
}

impl LinkStore {
    /// Cosine-similarity search over summary vectors, scoped to one
    /// user, excluding one link, top-k by ascending distance. Returns
    /// `(link_id, score)` with score rounded to two decimals.
    pub async fn vector_search(
        &self,
        query: &pgvector::Vector,
        user_id: i64,
        exclude_id: i64,
        k: i64,
    ) -> Result<Vec<(i64, f64)>> {
        let rows = sqlx::query_as::<_, (i64, f64)>(
            r#"
            SELECT id,
                   ROUND((1.0 / (1.0 + (summary_vector <=> $1)))::numeric, 2)::float8 AS score
            FROM links
            WHERE user_id = $2 AND id <> $3 AND summary_vector IS NOT NULL
            ORDER BY summary_vector <=> $1 ASC
            LIMIT $4
            "#,
        )
        .bind(query)
        .bind(user_id)
        .bind(exclude_id)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Ranked full-text search over title + summary + markdown via the
    /// store's text-ranking operator. Returns link ids, best first.
    pub async fn text_search(&self, query: &str, user_id: i64, k: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT id FROM links
            WHERE user_id = $2
              AND search_tsv @@ websearch_to_tsquery('english', $1)
            ORDER BY ts_rank(search_tsv, websearch_to_tsquery('english', $1)) DESC, id ASC
            LIMIT $3
            "#,
        )
        .bind(query)
        .bind(user_id)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
