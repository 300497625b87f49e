use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use super::Store;
use crate::db::{encode_date, now_timestamp, NewProgressEntry, ProgressEntry, ProgressFilter, ProgressPatch};

async fn fetch_entry<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<ProgressEntry>, sqlx::Error> {
    sqlx::query_as::<Sqlite, ProgressEntry>("SELECT * FROM progress_entries WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

impl Store {
    pub async fn get_progress(&self, id: i64) -> Result<Option<ProgressEntry>, sqlx::Error> {
        fetch_entry(&self.pool, id).await
    }

    /// Newest entries first.
    pub async fn list_progress(&self, filter: &ProgressFilter) -> Result<Vec<ProgressEntry>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT p.* FROM progress_entries p INNER JOIN students s ON s.id = p.student_id WHERE 1 = 1",
        );
        if let Some(student_id) = filter.student_id {
            query.push(" AND p.student_id = ").push_bind(student_id);
        }
        if let Some(teacher_id) = filter.visible_to_teacher {
            query
                .push(" AND (p.created_by = ")
                .push_bind(teacher_id)
                .push(" OR s.teacher_id = ")
                .push_bind(teacher_id)
                .push(")");
        }
        query.push(" ORDER BY p.date DESC, p.id DESC");

        query.build_query_as::<ProgressEntry>().fetch_all(&self.pool).await
    }

    pub async fn create_progress(&self, new: NewProgressEntry) -> Result<ProgressEntry, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO progress_entries (
                student_id, date, social_skills, pre_literacy, pre_numeracy, motor_skills,
                emotional_development, comments, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.student_id)
        .bind(encode_date(&new.date))
        .bind(new.social_skills.as_str())
        .bind(new.pre_literacy.as_str())
        .bind(new.pre_numeracy.as_str())
        .bind(new.motor_skills.as_str())
        .bind(new.emotional_development.as_str())
        .bind(&new.comments)
        .bind(new.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_progress(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_progress(
        &self,
        id: i64,
        patch: &ProgressPatch,
    ) -> Result<Option<ProgressEntry>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_entry(&mut *tx, id).await? else {
            return Ok(None);
        };
        let mut entry = existing.merged(patch);
        entry.updated_at = now_timestamp();

        sqlx::query(
            r#"
            UPDATE progress_entries SET
                student_id = ?, date = ?, social_skills = ?, pre_literacy = ?, pre_numeracy = ?,
                motor_skills = ?, emotional_development = ?, comments = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.student_id)
        .bind(encode_date(&entry.date))
        .bind(entry.social_skills.as_str())
        .bind(entry.pre_literacy.as_str())
        .bind(entry.pre_numeracy.as_str())
        .bind(entry.motor_skills.as_str())
        .bind(entry.emotional_development.as_str())
        .bind(&entry.comments)
        .bind(&entry.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(entry))
    }

    pub async fn delete_progress(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM progress_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::db::store::test_support::{store, student, teacher};
    use crate::db::{ClassName, NewProgressEntry, ProgressFilter, ProgressPatch, Rating};

    fn entry(student_id: i64, created_by: i64, day: u32) -> NewProgressEntry {
        NewProgressEntry {
            student_id,
            date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
            social_skills: Rating::Good,
            pre_literacy: Rating::Excellent,
            pre_numeracy: Rating::Good,
            motor_skills: Rating::NeedsImprovement,
            emotional_development: Rating::Good,
            comments: Some("Settling in well".to_string()),
            created_by,
        }
    }

    #[tokio::test]
    async fn test_visibility_filter_covers_author_and_owner() {
        let store = store().await;
        let t1 = teacher(&store, "t1@school.test", &[ClassName::Lkg]).await;
        let t2 = teacher(&store, "t2@school.test", &[ClassName::Lkg]).await;
        let s1 = student(&store, "Owned by t1", ClassName::Lkg, t1.id).await;
        let s2 = student(&store, "Owned by t2", ClassName::Lkg, t2.id).await;

        // t2 writes about t1's student, t1 writes about their own
        let by_t2 = store.create_progress(entry(s1.id, t2.id, 2)).await.unwrap();
        let by_t1 = store.create_progress(entry(s1.id, t1.id, 3)).await.unwrap();
        let other = store.create_progress(entry(s2.id, t2.id, 4)).await.unwrap();

        let for_t1 = store
            .list_progress(&ProgressFilter {
                visible_to_teacher: Some(t1.id),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<i64> = for_t1.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![by_t1.id, by_t2.id]);

        let for_t2 = store
            .list_progress(&ProgressFilter {
                visible_to_teacher: Some(t2.id),
                student_id: Some(s2.id),
            })
            .await
            .unwrap();
        assert_eq!(for_t2.iter().map(|e| e.id).collect::<Vec<_>>(), vec![other.id]);
    }

    #[tokio::test]
    async fn test_update_preserves_creator_and_delete_cascades() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Ukg]).await;
        let s = student(&store, "Anaya", ClassName::Ukg, t.id).await;
        let e = store.create_progress(entry(s.id, t.id, 10)).await.unwrap();

        let patch = ProgressPatch {
            comments: Some(None),
            motor_skills: Some(Rating::Excellent),
            ..Default::default()
        };
        let updated = store.update_progress(e.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.created_by, t.id);
        assert_eq!(updated.motor_skills, Rating::Excellent);
        assert!(updated.comments.is_none());
        assert_eq!(updated.date, e.date);

        store.delete_student(s.id).await.unwrap();
        assert!(store.get_progress(e.id).await.unwrap().is_none());
        assert!(!store.delete_progress(e.id).await.unwrap());
    }
}
