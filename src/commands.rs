use crate::checklist::{TaskBoard, TaskItem};
use crate::bridge::WindowBridge;
use crate::engine::{PhaseLabel, TimerEngine, TimerStateResponse};
use crate::models::{DaySummary, HistoryEntry, SyncStatusResponse};
use crate::records::{DailyRecordStore, DayReport, StoreError};
use crate::sync::DailyRecordSync;
use crate::Database;
use std::collections::BTreeMap;
use std::sync::Arc;
use tauri::{AppHandle, State};
use tracing::{debug, error, info, warn};

fn store_err(context: &str, e: StoreError) -> String {
    format!("{}: {}", context, e)
}

/// Store reads on the blocking pool; rusqlite must not stall the command executor
async fn with_store<T, F>(db: &Arc<Database>, context: &'static str, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| format!("{}: task failed: {}", context, e))?
        .map_err(|e| store_err(context, e))
}

// ============================================
// DAY LIFECYCLE
// ============================================

/// Start page: is there already a record for today?
#[tauri::command]
pub async fn bootstrap_day(db: State<'_, Arc<Database>>) -> Result<bool, String> {
    let exists = with_store(&db, "Failed to check today", |db| {
        Ok(db.get_record(crate::records::today())?.is_some())
    })
    .await?;
    debug!("[SETUP] Today's record exists: {}", exists);
    Ok(exists)
}

/// "Start the day": fresh checklist, today's record created if missing
#[tauri::command]
pub async fn start_day(
    db: State<'_, Arc<Database>>,
    tasks: State<'_, TaskBoard>,
) -> Result<(), String> {
    tasks.clear()?;
    with_store(&db, "Failed to add today", |db| db.add_today()).await?;
    info!("[SETUP] Day started");
    Ok(())
}

// ============================================
// TIMER
// ============================================

#[tauri::command]
pub async fn start_timer(
    label: String,
    hours: u32,
    minutes: u32,
    engine: State<'_, Arc<TimerEngine>>,
) -> Result<TimerStateResponse, String> {
    let label: PhaseLabel = label.parse()?;
    engine.start_phase(label, hours, minutes)
}

/// Timer view mounted
#[tauri::command]
pub async fn attach_timer(
    app: AppHandle,
    engine: State<'_, Arc<TimerEngine>>,
) -> Result<TimerStateResponse, String> {
    engine.inner().attach(Arc::new(WindowBridge::new(app)))?;
    engine.get_state()
}

/// Timer view unmounted
#[tauri::command]
pub async fn detach_timer(engine: State<'_, Arc<TimerEngine>>) -> Result<(), String> {
    engine.detach();
    Ok(())
}

/// Returns the label to offer next
#[tauri::command]
pub async fn stop_timer(engine: State<'_, Arc<TimerEngine>>) -> Result<PhaseLabel, String> {
    engine.stop()
}

#[tauri::command]
pub async fn get_timer_state(
    engine: State<'_, Arc<TimerEngine>>,
) -> Result<TimerStateResponse, String> {
    engine.get_state()
}

#[tauri::command]
pub async fn dismiss_alert(engine: State<'_, Arc<TimerEngine>>) -> Result<(), String> {
    engine.dismiss_alert();
    Ok(())
}

#[tauri::command]
pub async fn get_alert_enabled(engine: State<'_, Arc<TimerEngine>>) -> Result<bool, String> {
    Ok(engine.alert_enabled())
}

#[tauri::command]
pub async fn set_alert_enabled(
    enabled: bool,
    engine: State<'_, Arc<TimerEngine>>,
) -> Result<(), String> {
    engine.set_alert_enabled(enabled)
}

// ============================================
// DAILY RECORDS
// ============================================

#[tauri::command]
pub async fn get_today_time(label: String, db: State<'_, Arc<Database>>) -> Result<String, String> {
    let label: PhaseLabel = label.parse()?;
    with_store(&db, "Failed to read today's time", move |db| {
        db.get_today_time(label)
    })
    .await
}

#[tauri::command]
pub async fn get_today_tasks(db: State<'_, Arc<Database>>) -> Result<String, String> {
    with_store(&db, "Failed to read today's tasks", |db| db.get_today_tasks()).await
}

#[tauri::command]
pub async fn get_all_days(
    db: State<'_, Arc<Database>>,
) -> Result<BTreeMap<String, DayReport>, String> {
    with_store(&db, "Failed to read history", |db| db.get_all_reports()).await
}

/// Statistics view, newest day first
#[tauri::command]
pub async fn get_history(db: State<'_, Arc<Database>>) -> Result<Vec<HistoryEntry>, String> {
    let history = with_store(&db, "Failed to read history", |db| db.history()).await?;
    Ok(history
        .iter()
        .map(|(day, record)| HistoryEntry::new(*day, record))
        .collect())
}

/// End screen: any read failure shows zeros instead of an error
#[tauri::command]
pub async fn get_day_summary(
    label: String,
    db: State<'_, Arc<Database>>,
    sync: State<'_, DailyRecordSync>,
) -> Result<DaySummary, String> {
    let label: PhaseLabel = label.parse()?;
    // Let queued increments land first
    sync.flush().await;

    let time = with_store(&db, "Failed to read today's time", move |db| {
        db.get_today_time(label)
    })
    .await
    .inspect_err(|e| warn!("[SYNC] Summary time unavailable: {}", e))
    .ok();
    let tasks = with_store(&db, "Failed to read today's tasks", |db| db.get_today_tasks())
        .await
        .inspect_err(|e| warn!("[SYNC] Summary tasks unavailable: {}", e))
        .ok();
    Ok(DaySummary::from_parts(label, time, tasks))
}

#[tauri::command]
pub async fn get_sync_status(sync: State<'_, DailyRecordSync>) -> Result<SyncStatusResponse, String> {
    Ok(sync.stats().into())
}

// ============================================
// CHECKLIST
// ============================================

#[tauri::command]
pub async fn list_tasks(tasks: State<'_, TaskBoard>) -> Result<Vec<TaskItem>, String> {
    Ok(tasks.list())
}

#[tauri::command]
pub async fn add_task(text: String, tasks: State<'_, TaskBoard>) -> Result<Vec<TaskItem>, String> {
    Ok(tasks.add_task(&text))
}

#[tauri::command]
pub async fn toggle_task(id: i64, tasks: State<'_, TaskBoard>) -> Result<Vec<TaskItem>, String> {
    Ok(tasks.toggle_task(id))
}

/// Window-side log lines end up in the same subscriber
#[tauri::command]
pub async fn log_message(level: Option<String>, message: String) -> Result<(), String> {
    match level.as_deref().unwrap_or("info") {
        "error" => error!("[WINDOW] {}", message),
        "warn" => warn!("[WINDOW] {}", message),
        "debug" => debug!("[WINDOW] {}", message),
        _ => info!("[WINDOW] {}", message),
    }
    Ok(())
}
