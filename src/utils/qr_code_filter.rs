use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Expected capacity and false-positive rate.
/// The filter grows past the capacity; these only size the first slab.
const FILTER_CAPACITY: usize = 50_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static QR_CODE_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Set once every stored QR code has been loaded.
static WARM: AtomicBool = AtomicBool::new(false);

/// Whether a "not present" answer can be trusted.
pub fn is_warm() -> bool {
    WARM.load(Ordering::Acquire)
}

/// Check if a QR code might be assigned (false positives possible)
pub fn might_exist(qr_code: &str) -> bool {
    QR_CODE_FILTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&qr_code.to_string())
}

pub fn insert(qr_code: &str) {
    QR_CODE_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .add(&qr_code.to_string());
}

pub fn remove(qr_code: &str) {
    QR_CODE_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&qr_code.to_string());
}

/// Loads every QR code from `students`, streaming in batches.
pub async fn warmup_qr_code_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT qr_code FROM students").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (qr_code,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(qr_code);
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    WARM.store(true, Ordering::Release);
    log::info!("QR code filter warmup complete: {} students", total);
    Ok(())
}

fn insert_batch(qr_codes: &[String]) {
    let mut filter = QR_CODE_FILTER.write().unwrap_or_else(PoisonError::into_inner);

    for qr_code in qr_codes {
        filter.add(qr_code);
    }
}
