mod alert;
#[cfg(feature = "desktop")]
mod bridge;
mod checklist;
#[cfg(feature = "desktop")]
mod commands;
mod database;
mod engine;
#[cfg(feature = "desktop")]
mod ipc;
mod models;
mod records;
mod sync;

pub use crate::alert::{AlertPattern, CompletionSignal, Tone, ToneSink};
pub use crate::checklist::{Checklist, TaskBoard, TaskCounts, TaskItem};
pub use crate::engine::{
    advance_cursor, derive_remaining_seconds, minute_value, split_hours_minutes, EngineEvent,
    MinuteCursor, PhaseLabel, PhaseState, Tick, TimerConfig, TimerEngine, TimerObserver,
    TimerStateResponse, TimerStatus,
};
pub use crate::models::{DaySummary, HistoryEntry, SyncStatusResponse};
pub use crate::records::{DailyRecord, DailyRecordStore, DayReport, StoreError, StoreResult};
pub use crate::sync::{DailyRecordSync, SyncOp, SyncStats, SyncWorker};
pub use database::Database;


#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use crate::bridge::WindowBridge;
    use crate::checklist::TaskBoard;
    use crate::commands::*;
    use crate::engine::{TimerConfig, TimerEngine};
    use crate::records::DailyRecordStore;
    use crate::sync::DailyRecordSync;
    use crate::Database;
    use std::path::Path;
    use std::sync::Arc;
    use tauri::{AppHandle, Emitter, Manager, RunEvent};
    use tracing::{error, info, warn};

    const DB_FILE_NAME: &str = "timeapp.db";

    /// Open the database; a corrupted file is moved aside and replaced once
    fn open_database(app: &AppHandle, app_data_dir: &Path) -> Result<Arc<Database>, String> {
        let db_path = app_data_dir.join(DB_FILE_NAME);
        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| format!("Database path contains invalid UTF-8: {}", db_path.display()))?;

        let err = match Database::new(db_path_str) {
            Ok(db) => return Ok(Arc::new(db)),
            Err(e) => e,
        };
        let err_str = err.to_string().to_lowercase();
        let is_corruption = err_str.contains("corruption") || err_str.contains("integrity");
        if !is_corruption || !db_path.exists() {
            return Err(format!("Failed to initialize database: {}", err));
        }

        let backup_path = app_data_dir.join(format!(
            "{}.corrupted.{}",
            DB_FILE_NAME,
            chrono::Utc::now().timestamp()
        ));
        std::fs::rename(&db_path, &backup_path).map_err(|rename_e| {
            warn!(
                "[DB] Failed to rename corrupted DB to {:?}: {}",
                backup_path, rename_e
            );
            format!("Database corrupted and could not backup: {}", err)
        })?;
        info!(
            "[DB] Corrupted DB backed up to {:?}, starting fresh",
            backup_path
        );
        let _ = app.emit(crate::ipc::events::DB_RECOVERED, ());
        Database::new(db_path_str)
            .map(Arc::new)
            .map_err(|e| format!("Failed to create fresh database: {}", e))
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        // Default to info when RUST_LOG is not set so [TIMER]/[SYNC] lines are visible
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();

        #[cfg(desktop)]
        let builder = tauri::Builder::default()
            .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
                // One window per user: two engines would both account the same minutes
                if let Some(win) = app.get_webview_window("main") {
                    let _ = win.show();
                    let _ = win.set_focus();
                }
            }))
            .plugin(tauri_plugin_notification::init());
        #[cfg(not(desktop))]
        let builder = tauri::Builder::default().plugin(tauri_plugin_notification::init());

        let app = builder
            .setup(|app| {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|e| format!("Failed to get app data directory: {}", e))?;
                std::fs::create_dir_all(&app_data_dir).map_err(|e| {
                    let msg = match e.kind() {
                        std::io::ErrorKind::PermissionDenied => {
                            "Permission denied. Check app data directory is writable."
                        }
                        std::io::ErrorKind::StorageFull => "Disk full. Free space on drive.",
                        _ => "Failed to create app data directory.",
                    };
                    format!("{} Path: {} ({})", msg, app_data_dir.display(), e)
                })?;

                let db = open_database(app.handle(), &app_data_dir)?;
                db.ensure_record_file()
                    .map_err(|e| format!("Failed to prepare daily records: {}", e))?;

                let (sync, worker) = DailyRecordSync::new(db.clone());
                tauri::async_runtime::spawn(worker.run());

                let bridge = Arc::new(WindowBridge::new(app.handle().clone()));
                let engine = Arc::new(TimerEngine::with_db(
                    db.clone(),
                    sync.clone(),
                    bridge,
                    TimerConfig::default(),
                ));

                app.manage(TaskBoard::new(db.clone(), sync.clone()));
                app.manage(engine);
                app.manage(sync);
                app.manage(db);

                info!("[SETUP] Data directory {}", app_data_dir.display());
                Ok(())
            })
            .invoke_handler(tauri::generate_handler![
                // Day lifecycle
                bootstrap_day,
                start_day,
                // Timer
                start_timer,
                attach_timer,
                detach_timer,
                stop_timer,
                get_timer_state,
                dismiss_alert,
                get_alert_enabled,
                set_alert_enabled,
                // Daily records
                get_today_time,
                get_today_tasks,
                get_all_days,
                get_history,
                get_day_summary,
                get_sync_status,
                // Checklist
                list_tasks,
                add_task,
                toggle_task,
                log_message
            ])
            .build(tauri::generate_context!());

        let app = match app {
            Ok(app) => app,
            Err(e) => {
                error!("[SETUP] Failed to build application: {}", e);
                std::process::exit(1);
            }
        };

        app.run(|app_handle, event| {
            // No poll task or alert outlives the window
            if let RunEvent::ExitRequested { .. } = event {
                if let Some(engine) = app_handle.try_state::<Arc<TimerEngine>>() {
                    engine.detach();
                    info!("[SHUTDOWN] Timer detached");
                }
            }
        });
    }
}
