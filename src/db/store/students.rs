use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use super::Store;
use crate::db::{now_timestamp, writing_speed_for, ClassName, NewStudent, Student, StudentFilter, StudentPatch};

async fn fetch_student<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<Sqlite, Student>("SELECT * FROM students WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

impl Store {
    pub async fn get_student(&self, id: i64) -> Result<Option<Student>, sqlx::Error> {
        fetch_student(&self.pool, id).await
    }

    pub async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM students WHERE 1 = 1");
        if let Some(class) = filter.class {
            query.push(" AND class = ").push_bind(class.as_str());
        }
        if let Some(teacher_id) = filter.teacher_id {
            query.push(" AND teacher_id = ").push_bind(teacher_id);
        }
        query.push(" ORDER BY name COLLATE NOCASE, id");

        query.build_query_as::<Student>().fetch_all(&self.pool).await
    }

    pub async fn create_student(&self, new: NewStudent) -> Result<Student, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO students (
                name, age, class, parent_contact, learning_ability, writing_speed,
                notes, teacher_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(new.age)
        .bind(new.class.as_str())
        .bind(&new.parent_contact)
        .bind(new.learning_ability.as_str())
        .bind(writing_speed_for(new.class, new.writing_speed).as_str())
        .bind(&new.notes)
        .bind(new.teacher_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_student(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_student(
        &self,
        id: i64,
        patch: &StudentPatch,
    ) -> Result<Option<Student>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_student(&mut *tx, id).await? else {
            return Ok(None);
        };
        let mut student = existing.merged(patch);
        student.updated_at = now_timestamp();

        sqlx::query(
            r#"
            UPDATE students SET
                name = ?, age = ?, class = ?, parent_contact = ?, learning_ability = ?,
                writing_speed = ?, notes = ?, teacher_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&student.name)
        .bind(student.age)
        .bind(student.class.as_str())
        .bind(&student.parent_contact)
        .bind(student.learning_ability.as_str())
        .bind(student.writing_speed.as_str())
        .bind(&student.notes)
        .bind(student.teacher_id)
        .bind(&student.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(student))
    }

    /// Replace (or clear) the student's photo reference.
    pub async fn set_student_photo(
        &self,
        id: i64,
        photo: Option<(&str, &str)>,
    ) -> Result<Option<Student>, sqlx::Error> {
        let (url, public_id) = match photo {
            Some((url, public_id)) => (Some(url), Some(public_id)),
            None => (None, None),
        };

        let result = sqlx::query(
            "UPDATE students SET photo_url = ?, photo_public_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(url)
        .bind(public_id)
        .bind(now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_student(id).await
    }

    /// Delete a student together with its progress entries.
    pub async fn delete_student(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of students a teacher owns, optionally within one class
    pub async fn count_students_for_teacher(
        &self,
        teacher_id: i64,
        class: Option<ClassName>,
    ) -> Result<i64, sqlx::Error> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM students WHERE teacher_id = ");
        query.push_bind(teacher_id);
        if let Some(class) = class {
            query.push(" AND class = ").push_bind(class.as_str());
        }

        let count = query.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::store::test_support::{new_student, store, student, teacher};
    use crate::db::{ClassName, StudentFilter, StudentPatch, WritingSpeed};

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Lkg]).await;

        let mut new = new_student("Meera", ClassName::Lkg, t.id);
        new.parent_contact = Some("98450 12345".to_string());
        new.notes = Some("Left-handed".to_string());

        let created = store.create_student(new.clone()).await.unwrap();
        let fetched = store.get_student(created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.name, new.name);
        assert_eq!(fetched.age, new.age);
        assert_eq!(fetched.class, new.class);
        assert_eq!(fetched.parent_contact, new.parent_contact);
        assert_eq!(fetched.learning_ability, new.learning_ability);
        assert_eq!(fetched.writing_speed, new.writing_speed);
        assert_eq!(fetched.notes, new.notes);
        assert_eq!(fetched.teacher_id, new.teacher_id);
    }

    #[tokio::test]
    async fn test_nursery_students_store_not_applicable() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Nursery]).await;

        let mut new = new_student("Kabir", ClassName::Nursery, t.id);
        new.writing_speed = WritingSpeed::SpeedWriting;
        let created = store.create_student(new).await.unwrap();

        assert_eq!(created.writing_speed, WritingSpeed::NotApplicable);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Ukg]).await;

        let first = student(&store, "A", ClassName::Ukg, t.id).await;
        assert!(store.delete_student(first.id).await.unwrap());
        let second = student(&store, "B", ClassName::Ukg, t.id).await;

        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_second_delete_reports_missing() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Ukg]).await;
        let s = student(&store, "A", ClassName::Ukg, t.id).await;

        assert!(store.delete_student(s.id).await.unwrap());
        assert!(!store.delete_student(s.id).await.unwrap());
        assert!(store.get_student(s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = store().await;
        let t1 = teacher(&store, "t1@school.test", &[ClassName::Lkg, ClassName::Ukg]).await;
        let t2 = teacher(&store, "t2@school.test", &[ClassName::Lkg]).await;
        student(&store, "Zoya", ClassName::Lkg, t1.id).await;
        student(&store, "Arjun", ClassName::Ukg, t1.id).await;
        student(&store, "Ishaan", ClassName::Lkg, t2.id).await;

        let all = store.list_students(&StudentFilter::default()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Arjun", "Ishaan", "Zoya"]);

        let lkg_of_t1 = store
            .list_students(&StudentFilter {
                class: Some(ClassName::Lkg),
                teacher_id: Some(t1.id),
            })
            .await
            .unwrap();
        assert_eq!(lkg_of_t1.len(), 1);
        assert_eq!(lkg_of_t1[0].name, "Zoya");

        assert_eq!(store.count_students_for_teacher(t1.id, None).await.unwrap(), 2);
        assert_eq!(
            store
                .count_students_for_teacher(t1.id, Some(ClassName::Ukg))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_is_shallow_merge() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Lkg]).await;
        let mut new = new_student("Meera", ClassName::Lkg, t.id);
        new.notes = Some("Quiet".to_string());
        let s = store.create_student(new).await.unwrap();

        let patch = StudentPatch {
            age: Some(5),
            ..Default::default()
        };
        let updated = store.update_student(s.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.age, 5);
        assert_eq!(updated.notes.as_deref(), Some("Quiet"));

        let fetched = store.get_student(s.id).await.unwrap().unwrap();
        assert_eq!(fetched, updated);

        assert!(store.update_student(999, &patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_photo_can_be_set_and_cleared() {
        let store = store().await;
        let t = teacher(&store, "t@school.test", &[ClassName::Lkg]).await;
        let s = student(&store, "Meera", ClassName::Lkg, t.id).await;

        let with_photo = store
            .set_student_photo(s.id, Some(("/uploads/a.jpg", "local:a.jpg")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(with_photo.photo_url.as_deref(), Some("/uploads/a.jpg"));
        assert_eq!(with_photo.photo_public_id.as_deref(), Some("local:a.jpg"));

        let cleared = store.set_student_photo(s.id, None).await.unwrap().unwrap();
        assert!(cleared.photo_url.is_none());

        assert!(store.set_student_photo(999, None).await.unwrap().is_none());
    }
}
