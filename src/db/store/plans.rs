use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use super::Store;
use crate::db::{encode_date, now_timestamp, NewTeachingPlan, PlanFilter, PlanPatch, TeachingPlan};

async fn fetch_plan<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<TeachingPlan>, sqlx::Error> {
    sqlx::query_as::<Sqlite, TeachingPlan>("SELECT * FROM teaching_plans WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

impl Store {
    pub async fn get_plan(&self, id: i64) -> Result<Option<TeachingPlan>, sqlx::Error> {
        fetch_plan(&self.pool, id).await
    }

    pub async fn list_plans(&self, filter: &PlanFilter) -> Result<Vec<TeachingPlan>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM teaching_plans WHERE 1 = 1");
        if let Some(plan_type) = filter.plan_type {
            query.push(" AND plan_type = ").push_bind(plan_type.as_str());
        }
        if let Some(class) = filter.class {
            query.push(" AND class = ").push_bind(class.as_str());
        }
        if let Some(created_by) = filter.created_by {
            query.push(" AND created_by = ").push_bind(created_by);
        }
        query.push(" ORDER BY start_date DESC, id DESC");

        query.build_query_as::<TeachingPlan>().fetch_all(&self.pool).await
    }

    pub async fn create_plan(&self, new: NewTeachingPlan) -> Result<TeachingPlan, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO teaching_plans (
                plan_type, class, title, description, activities, goals,
                start_date, end_date, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.plan_type.as_str())
        .bind(new.class.as_str())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.activities)
        .bind(&new.goals)
        .bind(encode_date(&new.start_date))
        .bind(encode_date(&new.end_date))
        .bind(new.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_plan(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_plan(&self, id: i64, patch: &PlanPatch) -> Result<Option<TeachingPlan>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_plan(&mut *tx, id).await? else {
            return Ok(None);
        };
        let mut plan = existing.merged(patch);
        plan.updated_at = now_timestamp();

        sqlx::query(
            r#"
            UPDATE teaching_plans SET
                plan_type = ?, class = ?, title = ?, description = ?, activities = ?, goals = ?,
                start_date = ?, end_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(plan.plan_type.as_str())
        .bind(plan.class.as_str())
        .bind(&plan.title)
        .bind(&plan.description)
        .bind(&plan.activities)
        .bind(&plan.goals)
        .bind(encode_date(&plan.start_date))
        .bind(encode_date(&plan.end_date))
        .bind(&plan.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(plan))
    }

    pub async fn delete_plan(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM teaching_plans WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::db::store::test_support::{store, teacher};
    use crate::db::{ClassName, NewTeachingPlan, PlanFilter, PlanPatch, PlanType};

    fn plan(plan_type: PlanType, class: ClassName, created_by: i64, month: u32) -> NewTeachingPlan {
        NewTeachingPlan {
            plan_type,
            class,
            title: format!("{} plan", class),
            description: "Colours and shapes".to_string(),
            activities: "Finger painting".to_string(),
            goals: "Name five colours".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, month, 28).unwrap(),
            created_by,
        }
    }

    #[tokio::test]
    async fn test_filters_and_ordering() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Lkg, ClassName::Ukg]).await;
        let june = store.create_plan(plan(PlanType::Monthly, ClassName::Lkg, t.id, 6)).await.unwrap();
        let july = store.create_plan(plan(PlanType::Monthly, ClassName::Lkg, t.id, 7)).await.unwrap();
        store.create_plan(plan(PlanType::Weekly, ClassName::Ukg, t.id, 8)).await.unwrap();
        store.create_plan(plan(PlanType::Monthly, ClassName::Lkg, t.id + 100, 9)).await.unwrap();

        let mine = store
            .list_plans(&PlanFilter {
                plan_type: Some(PlanType::Monthly),
                class: Some(ClassName::Lkg),
                created_by: Some(t.id),
            })
            .await
            .unwrap();
        assert_eq!(mine.iter().map(|p| p.id).collect::<Vec<_>>(), vec![july.id, june.id]);
    }

    #[tokio::test]
    async fn test_update_keeps_creator() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Nursery]).await;
        let p = store.create_plan(plan(PlanType::Annual, ClassName::Nursery, t.id, 4)).await.unwrap();

        let patch = PlanPatch {
            title: Some("Revised".to_string()),
            ..Default::default()
        };
        let updated = store.update_plan(p.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.title, "Revised");
        assert_eq!(updated.created_by, t.id);
        assert_eq!(updated.goals, p.goals);

        assert!(store.delete_plan(p.id).await.unwrap());
        assert!(!store.delete_plan(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_schema_rejects_inverted_dates() {
        let store = store().await;
        let mut bad = plan(PlanType::Weekly, ClassName::Lkg, 1, 5);
        std::mem::swap(&mut bad.start_date, &mut bad.end_date);

        assert!(store.create_plan(bad).await.is_err());
    }
}
