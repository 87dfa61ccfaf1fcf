use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::student::Student;
use crate::scan::store::STUDENT_COLUMNS;

/// Students keyed by QR code, for scan lookups and QR availability checks.
pub static STUDENT_CACHE: Lazy<Cache<String, Student>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

pub async fn get(qr_code: &str) -> Option<Student> {
    STUDENT_CACHE.get(qr_code).await
}

pub async fn put(student: Student) {
    STUDENT_CACHE.insert(student.qr_code.clone(), student).await;
}

pub async fn invalidate(qr_code: &str) {
    STUDENT_CACHE.invalidate(qr_code).await;
}

/// True if the cache knows the code is taken; a miss says nothing.
pub fn is_taken(qr_code: &str) -> bool {
    STUDENT_CACHE.contains_key(qr_code)
}

async fn batch_put(students: Vec<Student>) {
    let futures: Vec<_> = students.into_iter().map(put).collect();

    futures::future::join_all(futures).await;
}

/// Loads students created in the last `days` days, newest first, in batches.
pub async fn warmup_student_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let sql = format!(
        r#"
        SELECT {STUDENT_COLUMNS}
        FROM students
        WHERE created_at >= NOW() - INTERVAL ? DAY
        ORDER BY created_at DESC
        "#
    );
    let mut stream = sqlx::query_as::<_, Student>(&sql).bind(days).fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        batch.push(row?);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_put(std::mem::take(&mut batch)).await;
        }
    }

    if !batch.is_empty() {
        batch_put(batch).await;
    }

    log::info!(
        "Student cache warmup complete: {} recent students (last {} days)",
        total_count,
        days
    );

    Ok(())
}
